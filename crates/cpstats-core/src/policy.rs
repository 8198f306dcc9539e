use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::platform::Platform;
use crate::retry::{Backoff, RetryConfig, MAX_JITTER_RATIO};
use crate::source::AdapterStrategy;

/// Resilience settings applied to one platform's adapter calls.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformPolicy {
    pub platform: Platform,
    pub strategy: AdapterStrategy,
    pub max_concurrency: usize,
    pub max_queue: usize,
    /// Hard timeout for a single adapter attempt.
    pub call_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
    pub retry_backoff: BackoffPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            enabled: self.max_retries > 0,
            max_retries: self.max_retries,
            backoff: Backoff::Exponential {
                base: self.initial_delay,
                max: self.max_delay,
                jitter_ratio: MAX_JITTER_RATIO,
            },
        }
    }
}

impl PlatformPolicy {
    fn api(platform: Platform, max_concurrency: usize, max_queue: usize) -> Self {
        Self {
            platform,
            strategy: AdapterStrategy::Api,
            max_concurrency,
            max_queue,
            call_timeout: Duration::from_secs(10),
            breaker: CircuitBreakerConfig::default(),
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(8),
                max_retries: 3,
            },
        }
    }

    fn browser(platform: Platform) -> Self {
        Self {
            platform,
            strategy: AdapterStrategy::Browser,
            max_concurrency: 2,
            max_queue: 16,
            call_timeout: Duration::from_secs(30),
            breaker: CircuitBreakerConfig::default(),
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(10),
                max_retries: 2,
            },
        }
    }

    pub fn leetcode_default() -> Self {
        Self::api(Platform::LeetCode, 4, 32)
    }

    /// Codeforces asks API clients to stay near one call every two seconds.
    pub fn codeforces_default() -> Self {
        Self::api(Platform::Codeforces, 2, 32)
    }

    pub fn github_default() -> Self {
        Self::api(Platform::GitHub, 8, 64)
    }

    pub fn codechef_default() -> Self {
        Self::browser(Platform::CodeChef)
    }

    pub fn atcoder_default() -> Self {
        Self::browser(Platform::AtCoder)
    }

    pub fn default_for(platform: Platform) -> Self {
        match platform {
            Platform::LeetCode => Self::leetcode_default(),
            Platform::Codeforces => Self::codeforces_default(),
            Platform::GitHub => Self::github_default(),
            Platform::CodeChef => Self::codechef_default(),
            Platform::AtCoder => Self::atcoder_default(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry_backoff.retry_config()
    }
}
