//! Crypto Narrator Library
//!
//! Price fetching with retries and caching, spoken narration of prices, and
//! the CLI and HTTP front ends built on them.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod narrator;
pub mod pacing;
pub mod web;
