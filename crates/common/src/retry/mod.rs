//! Bounded retry with exponential backoff and jitter.
//!
//! Retry behaviour is carried by an explicit [`RetryStrategy`] policy
//! object rather than ad-hoc loops at call sites, so the backoff
//! arithmetic is unit-testable without any HTTP in sight. Only transient
//! error classes are retried (see `MtdError::is_transient`); a
//! server-supplied delay on a rate limit takes precedence over the
//! computed backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use taxdesk_domain::constants::{
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_JITTER_FACTOR, DEFAULT_RETRY_MAX_ATTEMPTS,
    DEFAULT_RETRY_MAX_DELAY,
};
use taxdesk_domain::{MtdError, Result};
use tracing::{debug, warn};

const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Retry policy: attempt bound, backoff shape, jitter.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
            jitter_factor: DEFAULT_RETRY_JITTER_FACTOR,
        }
    }
}

impl RetryStrategy {
    /// Policy for transient resource-API failures: 5 attempts, 1 s base,
    /// 30 s cap, 30% jitter.
    #[must_use]
    pub fn transient_api_policy() -> Self {
        Self::default()
    }

    /// Single attempt, no retries. Useful in tests and for endpoints that
    /// must never be replayed.
    #[must_use]
    pub fn no_retries() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Set the total attempt bound (initial try included).
    ///
    /// # Errors
    /// Returns `MtdError::Config` for a zero bound.
    pub fn with_max_attempts(mut self, attempts: u32) -> Result<Self> {
        if attempts == 0 {
            return Err(MtdError::Config("max_attempts must be at least 1".to_string()));
        }
        self.max_attempts = attempts;
        Ok(self)
    }

    /// Set the base delay for the first retry.
    ///
    /// # Errors
    /// Returns `MtdError::Config` when the base exceeds the cap.
    pub fn with_base_delay(mut self, delay: Duration) -> Result<Self> {
        if delay > self.max_delay {
            return Err(MtdError::Config(format!(
                "base_delay ({delay:?}) cannot exceed max_delay ({:?})",
                self.max_delay
            )));
        }
        self.base_delay = delay;
        Ok(self)
    }

    /// Set the cap applied to any single backoff delay.
    ///
    /// # Errors
    /// Returns `MtdError::Config` when the cap is below the base delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Result<Self> {
        if delay < self.base_delay {
            return Err(MtdError::Config(format!(
                "max_delay ({delay:?}) cannot be less than base_delay ({:?})",
                self.base_delay
            )));
        }
        self.max_delay = delay;
        Ok(self)
    }

    /// Set the jitter factor (0.0 = none, 1.0 = full-range).
    #[must_use]
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Total attempt bound.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Jittered backoff delay before retry number `retry_number`
    /// (1-based).
    #[must_use]
    pub fn delay_for(&self, retry_number: u32) -> Duration {
        self.apply_jitter(self.exponential_delay(retry_number))
    }

    fn exponential_delay(&self, retry_number: u32) -> Duration {
        let base_millis = self.base_delay.as_millis() as u64;
        let max_millis = self.max_delay.as_millis() as u64;

        let exponent = retry_number.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let multiplier = 2_u64.saturating_pow(exponent);

        Duration::from_millis(base_millis.saturating_mul(multiplier).min(max_millis))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let spread = self.jitter_factor * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
        let jittered = delay.as_millis() as f64 * (1.0 + spread);
        let capped = (jittered as u64).min(self.max_delay.as_millis() as u64);

        Duration::from_millis(capped)
    }

    /// Run `operation` under this policy.
    ///
    /// The operation receives the 1-based attempt number. Transient
    /// errors are retried up to the attempt bound with backoff between
    /// attempts; a rate limit's server-supplied delay overrides the
    /// computed backoff. Terminal errors and exhausted bounds surface the
    /// underlying error unchanged.
    ///
    /// # Errors
    /// The last error produced by `operation`.
    pub async fn run<T, Op, Fut>(&self, name: &str, mut operation: Op) -> Result<T>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = name, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = err
                        .retry_after_secs()
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.delay_for(attempt));

                    warn!(
                        operation = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
