//! Bounded exponential-backoff retry for API requests.
//!
//! Transport-level failures (connection refused, DNS, timeouts) are worth
//! retrying; answers from the remote service are not. Attempts classify their
//! failures accordingly and [`run_with_retry`] drives the loop, keeping the
//! backoff math separate from the transport mechanics.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use super::client::ApiError;

/// Default number of attempts for one logical API call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit; the first wait after a failure.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How a single request attempt failed.
#[derive(Debug)]
pub enum AttemptError {
    /// Transport-level failure; the attempt may be retried.
    Transient(String),
    /// The service answered with an error; retrying cannot help.
    Fatal(ApiError),
}

/// Attempt budget and backoff schedule for one logical API call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and backoff unit.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Returns the maximum number of attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the wait before the attempt following failure number `attempt`.
    ///
    /// The schedule doubles per failure: base, 2x base, 4x base, ...
    /// `attempt` is 1-based (the wait after the first failure is `backoff(1)`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay * (1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

/// Runs `attempt_fn` until it succeeds, fails fatally, or the policy's
/// attempt budget is exhausted.
///
/// Transient failures sleep for `policy.backoff(n)` before attempt `n + 1`.
/// An exhausted budget is reported as an [`ApiError`] with the status
/// sentinel 0 and the last transport error's message.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut attempt_fn: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut failures = 0;
    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(AttemptError::Transient(message)) => {
                failures += 1;
                if failures < policy.max_attempts() {
                    let wait = policy.backoff(failures);
                    warn!(
                        "API request failed, retrying in {:?} ({}/{})",
                        wait,
                        failures,
                        policy.max_attempts()
                    );
                    tokio::time::sleep(wait).await;
                } else {
                    error!(
                        "connection error after {} attempts: {}",
                        policy.max_attempts(),
                        message
                    );
                    return Err(ApiError::connection(message));
                }
            }
        }
    }
}
