//! Cache module for price responses and narration audio
//!
//! Provides a generic TTL cache with oldest-first eviction and optional
//! write-through persistence to a JSON file. The price fetcher and the
//! narrator each own their own instance.

mod manager;

pub use manager::{CacheEntry, CacheManager, Lookup};
