//! Per-platform resilience controller.
//!
//! [`ResilienceController::execute`] wraps one adapter invocation in, from the
//! outside in:
//!
//! 1. the circuit breaker, rejecting before any resource is taken;
//! 2. the backpressure gate (bounded concurrency plus bounded FIFO queue);
//! 3. the retry loop, each attempt under the platform's hard call timeout.
//!
//! One execution counts once against the breaker, after retries are
//! exhausted. Pool exhaustion is local backpressure and is never counted.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::backpressure::{BackpressureGate, QueueFull};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitDecision, CircuitState};
use crate::error::PipelineError;
use crate::platform::Platform;
use crate::policy::PlatformPolicy;
use crate::retry::RetryConfig;
use crate::source::{SourceError, SourceErrorKind};

/// Diagnostic view of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResilienceSnapshot {
    pub platform: Platform,
    pub circuit: CircuitState,
    pub consecutive_failures: u32,
    pub in_flight: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queue: usize,
}

#[derive(Debug)]
pub struct ResilienceController {
    platform: Platform,
    breaker: CircuitBreaker,
    gate: BackpressureGate,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl ResilienceController {
    pub fn new(
        platform: Platform,
        breaker: CircuitBreakerConfig,
        max_concurrent: usize,
        max_queue: usize,
        retry: RetryConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            breaker: CircuitBreaker::new(breaker),
            gate: BackpressureGate::new(max_concurrent, max_queue),
            retry,
            call_timeout,
        }
    }

    pub fn from_policy(policy: &PlatformPolicy) -> Self {
        Self::new(
            policy.platform,
            policy.breaker,
            policy.max_concurrency,
            policy.max_queue,
            policy.retry_config(),
            policy.call_timeout,
        )
    }

    pub const fn platform(&self) -> Platform {
        self.platform
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `operation` under breaker, backpressure, retry and timeout.
    ///
    /// `operation` receives the 0-based attempt number and is invoked once
    /// per attempt. Breaker and queue rejections never reach it.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, PipelineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.check_circuit()?;

        let _permit = self.gate.acquire().await.map_err(|rejection| {
            debug!(
                platform = %self.platform,
                in_flight = rejection.in_flight,
                queued = rejection.queued,
                "request queue is full"
            );
            self.queue_full(rejection)
        })?;

        // The breaker may have opened while this call waited in the queue.
        self.check_circuit()?;

        let mut attempt = 0_u32;
        loop {
            let error = match tokio::time::timeout(self.call_timeout, operation(attempt)).await {
                Ok(Ok(value)) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Ok(Err(error)) => error,
                Err(_) => SourceError::timeout(format!(
                    "{} call exceeded {}ms",
                    self.platform,
                    self.call_timeout.as_millis()
                )),
            };

            if self.retry.should_retry(&error, attempt) {
                let delay = self.retry.delay_for_attempt(attempt);
                debug!(
                    platform = %self.platform,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying adapter call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            self.record_failure(&error);
            return Err(PipelineError::from_source(self.platform, error));
        }
    }

    pub fn snapshot(&self) -> ResilienceSnapshot {
        let gate = self.gate.snapshot();
        ResilienceSnapshot {
            platform: self.platform,
            circuit: self.breaker.state(),
            consecutive_failures: self.breaker.consecutive_failures(),
            in_flight: gate.in_flight,
            queued: gate.queued,
            max_concurrent: gate.max_concurrent,
            max_queue: gate.max_queue,
        }
    }

    fn check_circuit(&self) -> Result<(), PipelineError> {
        match self.breaker.allow() {
            CircuitDecision::Allow => Ok(()),
            CircuitDecision::Reject { retry_after } => {
                debug!(
                    platform = %self.platform,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "circuit open, rejecting call"
                );
                Err(PipelineError::CircuitOpen {
                    platform: self.platform,
                    retry_after,
                })
            }
        }
    }

    fn record_failure(&self, error: &SourceError) {
        if error.kind() == SourceErrorKind::PoolExhausted {
            return;
        }

        if self.breaker.record_failure() {
            warn!(
                platform = %self.platform,
                failures = self.breaker.config().failure_threshold,
                cooldown_ms = self.breaker.config().cooldown.as_millis() as u64,
                error = %error,
                "circuit opened"
            );
        }
    }

    fn queue_full(&self, rejection: QueueFull) -> PipelineError {
        PipelineError::QueueFull {
            platform: self.platform,
            in_flight: rejection.in_flight,
            queued: rejection.queued,
            max_queue: rejection.max_queue,
        }
    }
}
