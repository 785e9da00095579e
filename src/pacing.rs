//! Sleeping and request pacing
//!
//! All waits in the crate (retry backoff, minimum request spacing, pauses
//! between narrations) go through [`Sleeper`] so tests can record them instead
//! of actually sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Something that can wait for a duration
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately and remembers every requested duration
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Durations requested so far, in call order
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
    }
}

/// Enforces a minimum spacing between dispatched requests
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_dispatch: Option<Instant>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: None,
        }
    }

    /// Waits until `min_interval` has passed since the previous dispatch,
    /// then marks a new dispatch.
    pub async fn wait_turn(&mut self, sleeper: &dyn Sleeper) {
        if let Some(remaining) = self.remaining(Instant::now()) {
            sleeper.sleep(remaining).await;
        }
        self.last_dispatch = Some(Instant::now());
    }

    /// Time left before the next dispatch is allowed, if any
    fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.min_interval.is_zero() {
            return None;
        }
        let last = self.last_dispatch?;
        let elapsed = now.saturating_duration_since(last);
        let remaining = self.min_interval.saturating_sub(elapsed);
        (!remaining.is_zero()).then_some(remaining)
    }
}
