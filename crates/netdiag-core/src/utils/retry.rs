//! Retry with exponential backoff
//!
//! Delays grow as `initial_delay * multiplier^(attempt - 1)` and are capped at
//! `max_delay`. A classifier decides per error whether to retry and how much
//! to stretch the delay (rate limits wait longer than timeouts).

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff settings
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for a single delay, before scaling
    pub max_delay: Duration,
    /// Growth factor between attempts
    pub backoff_multiplier: f64,
    /// Add up to 25% jitter
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set total attempts
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the first delay
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    fn calculate_delay(&self, attempt: u32, scale: f64) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay_ms = (capped * scale.max(0.0)) as u64;

        let delay_ms = if self.jitter {
            delay_ms + time_jitter(delay_ms / 4)
        } else {
            delay_ms
        };
        Duration::from_millis(delay_ms)
    }
}

fn time_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);
    nanos % max
}

/// Final failure after retrying
#[derive(Debug)]
pub struct RetryError<E> {
    /// The last error seen
    pub last_error: E,
    /// Attempts made
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed after {} attempts: {}", self.attempts, self.last_error)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Run `operation`, retrying errors for which `is_retryable` holds
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    config: &RetryConfig,
    operation: F,
    is_retryable: R,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Debug,
{
    retry_with_scaled_backoff(config, operation, |e| is_retryable(e).then_some(1.0)).await
}

/// Run `operation`; `classify` returns `None` to stop, or the factor applied
/// to the next delay
pub async fn retry_with_scaled_backoff<T, E, F, Fut, C>(
    config: &RetryConfig,
    mut operation: F,
    classify: C,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Option<f64>,
    E: std::fmt::Debug,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => match classify(&e) {
                Some(scale) if attempt < config.max_attempts => {
                    let delay = config.calculate_delay(attempt, scale);
                    warn!(
                        attempt,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = ?e,
                        "Operation failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                _ => {
                    debug!(attempt, error = ?e, "Operation failed, giving up");
                    return Err(RetryError {
                        last_error: e,
                        attempts: attempt,
                    });
                }
            },
        }
    }
}
