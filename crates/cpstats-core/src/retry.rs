//! Retry classification and exponential backoff with jitter.

use std::time::Duration;

use crate::source::SourceError;

/// Upper bound on the jitter fraction applied to the exponential term.
pub const MAX_JITTER_RATIO: f64 = 0.1;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// `min(max, base * 2^attempt + jitter)`.
    ///
    /// `jitter` is a random fraction in `[0, jitter_ratio]` of the
    /// exponential term, so the delay never drops below `base * 2^attempt`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Jitter fraction, clamped to [`MAX_JITTER_RATIO`].
        jitter_ratio: f64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
            jitter_ratio: MAX_JITTER_RATIO,
        }
    }
}

impl Backoff {
    /// Calculate the delay for a given retry attempt (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                max,
                jitter_ratio,
            } => {
                let exponent = attempt.min(32) as i32;
                let exponential = base.as_secs_f64() * 2_f64.powi(exponent);
                let ratio = jitter_ratio.clamp(0.0, MAX_JITTER_RATIO);
                let jitter = exponential * ratio * fastrand::f64();
                let capped = (exponential + jitter).min(max.as_secs_f64());

                Duration::from_secs_f64(capped.max(0.0))
            }
        }
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Enables or disables the retry mechanism.
    pub enabled: bool,
    /// The maximum number of retries to attempt.
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32, base: Duration, max: Duration) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::Exponential {
                base,
                max,
                jitter_ratio: MAX_JITTER_RATIO,
            },
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether a failed attempt number `attempt` (0-based) should be retried.
    ///
    /// Not found, auth, blocked, parse failures and 4xx other than 429 are
    /// terminal. Network, timeout, 5xx and rate-limit errors are retried
    /// until the budget runs out.
    pub fn should_retry(&self, error: &SourceError, attempt: u32) -> bool {
        self.enabled && attempt < self.max_retries && error.retryable()
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
