use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::clock::deadline;

/// Runtime circuit state for one upstream platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    Closed,
    Open,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Admission decision returned by [`CircuitBreaker::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    Allow,
    Reject { retry_after: Duration },
}

#[derive(Debug, Default)]
struct CircuitInner {
    consecutive_failures: u32,
    reopen_at: Option<Instant>,
}

impl CircuitInner {
    /// Closes an open circuit whose cooldown has elapsed.
    ///
    /// Expiry is evaluated against the clock on every access, so the circuit
    /// closes at `reopen_at` whether or not traffic arrives in between.
    fn settle(&mut self, now: Instant) {
        if self.reopen_at.is_some_and(|reopen_at| now >= reopen_at) {
            self.reopen_at = None;
            self.consecutive_failures = 0;
        }
    }
}

/// Thread-safe circuit breaker for adapter calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    pub fn allow(&self) -> CircuitDecision {
        let now = Instant::now();
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.settle(now);

        match inner.reopen_at {
            None => CircuitDecision::Allow,
            Some(reopen_at) => CircuitDecision::Reject {
                retry_after: reopen_at.saturating_duration_since(now),
            },
        }
    }

    pub fn allow_request(&self) -> bool {
        self.allow() == CircuitDecision::Allow
    }

    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.consecutive_failures = 0;
        inner.reopen_at = None;
    }

    /// Records one failed execution. Returns `true` when this failure opened
    /// the circuit.
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.settle(now);
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if inner.reopen_at.is_none() && inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.reopen_at = Some(deadline(now, self.config.cooldown));
            return true;
        }

        false
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.settle(Instant::now());
        if inner.reopen_at.is_some() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.settle(Instant::now());
        inner.consecutive_failures
    }
}
