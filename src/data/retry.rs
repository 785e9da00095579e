//! Retrying request primitive
//!
//! Every price API call goes through [`RetryingClient::get_validated`], which
//! owns the backoff contract:
//!
//! - 2xx with a parseable body: hand the JSON to the validator and return
//! - status in the retryable set, or a connection/timeout error: sleep, grow
//!   the delay by the backoff factor, try again while attempts remain
//! - HTTP 429: the sleep is at least twice the computed delay
//! - any other status, an unparseable body, or a validator rejection: stop
//!   immediately
//!
//! A [`Backoff`] carries the attempt budget. Operations made of several
//! requests pass the same `Backoff` to each so they share one budget.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::transport::{Transport, TransportError};
use super::FetchError;
use crate::config::RetrySettings;
use crate::pacing::{RequestPacer, Sleeper};

/// Status code that signals rate limiting
const TOO_MANY_REQUESTS: u16 = 429;

/// Longest base delay between two attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Retry parameters for the price API
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub retryable_statuses: HashSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            initial_delay: settings.initial_backoff(),
            backoff_factor: settings.backoff_factor,
            retryable_statuses: settings.retryable_statuses(),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Starts a fresh attempt budget
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_attempts: self.max_attempts,
            backoff_factor: self.backoff_factor,
            attempts: 0,
            delay: self.initial_delay,
        }
    }
}

/// Attempt counter and current delay for one logical operation
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    max_attempts: u32,
    backoff_factor: f64,
    attempts: u32,
    delay: Duration,
}

impl Backoff {
    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn can_attempt(&self) -> bool {
        self.attempts < self.max_attempts
    }

    fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Delay to sleep before the next attempt, or `None` when the budget is
    /// spent. Advances the base delay by the backoff factor.
    fn next_delay(&mut self, status: Option<u16>) -> Option<Duration> {
        if !self.can_attempt() {
            return None;
        }
        let computed = self.delay.min(MAX_RETRY_DELAY);
        self.delay = scale_delay(computed, self.backoff_factor);
        if status == Some(TOO_MANY_REQUESTS) {
            Some(computed.saturating_mul(2))
        } else {
            Some(computed)
        }
    }
}

/// Multiplies a delay, saturating at [`MAX_RETRY_DELAY`]
fn scale_delay(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
        .map_or(MAX_RETRY_DELAY, |scaled| scaled.min(MAX_RETRY_DELAY))
}

/// Sends paced, retried GET requests and decodes JSON responses
pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    pacer: RequestPacer,
}

impl RetryingClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        min_request_interval: Duration,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            pacer: RequestPacer::new(min_request_interval),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GETs `url`, retrying transient failures within `backoff`'s budget, and
    /// returns whatever `validate` extracts from the decoded JSON body.
    pub async fn get_validated<T, F>(
        &mut self,
        url: &str,
        query: &[(String, String)],
        backoff: &mut Backoff,
        validate: F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&Value) -> Result<T, FetchError>,
    {
        loop {
            if !backoff.can_attempt() {
                // Budget already spent by an earlier request of this operation
                return Err(FetchError::RetriesExhausted {
                    attempts: backoff.attempts(),
                    last: Box::new(FetchError::Network("no attempts left".into())),
                });
            }

            self.pacer.wait_turn(self.sleeper.as_ref()).await;
            backoff.record_attempt();
            debug!("GET {} (attempt {})", url, backoff.attempts());

            let (failure, status) = match self.transport.get(url, query).await {
                Ok(response) if response.is_success() => {
                    let value: Value = serde_json::from_str(&response.body).map_err(|e| {
                        error!("Could not decode response from {}: {}", url, e);
                        FetchError::MalformedResponse(e.to_string())
                    })?;
                    return validate(&value);
                }
                Ok(response) => {
                    let failure = FetchError::Upstream {
                        status: response.status,
                    };
                    if !self.policy.is_retryable_status(response.status) {
                        error!("{} returned non-retryable HTTP {}", url, response.status);
                        return Err(failure);
                    }
                    (failure, Some(response.status))
                }
                Err(TransportError::Timeout) => (FetchError::Network("request timed out".into()), None),
                Err(e) => (FetchError::Network(e.to_string()), None),
            };

            match backoff.next_delay(status) {
                Some(delay) => {
                    warn!(
                        "{} failed on attempt {} ({}); retrying in {:.2}s",
                        url,
                        backoff.attempts(),
                        failure,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay).await;
                }
                None => {
                    error!("{} failed after {} attempts: {}", url, backoff.attempts(), failure);
                    return Err(FetchError::RetriesExhausted {
                        attempts: backoff.attempts(),
                        last: Box::new(failure),
                    });
                }
            }
        }
    }
}
