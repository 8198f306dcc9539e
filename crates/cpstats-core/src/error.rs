use std::time::Duration;

use thiserror::Error;

use crate::admission::{BandwidthRejection, RateLimitRejection};
use crate::platform::Platform;
use crate::source::{SourceError, SourceErrorKind};

/// Caller-input errors raised by detection and normalization.
///
/// These are terminal: retrying with the same input cannot succeed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no supported platform matches reference '{reference}'")]
    UnsupportedPlatform { reference: String },
    #[error("invalid profile reference '{reference}': {reason}")]
    InvalidReference {
        reference: String,
        reason: &'static str,
    },
    #[error("invalid platform '{value}', expected one of leetcode, codeforces, github, codechef, atcoder")]
    InvalidPlatform { value: String },
    #[error("invalid normalizer input: {reason}")]
    InvalidInput { reason: String },
}

impl ValidationError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedPlatform { .. } => "detect.unsupported_platform",
            Self::InvalidReference { .. } => "detect.invalid_reference",
            Self::InvalidPlatform { .. } => "detect.invalid_platform",
            Self::InvalidInput { .. } => "normalize.invalid_input",
        }
    }
}

/// Every failure a pipeline lookup can end in.
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{platform}: {source}")]
    Source {
        platform: Platform,
        #[source]
        source: SourceError,
    },

    #[error("{platform} circuit breaker is open; retry in {}ms", retry_after.as_millis())]
    CircuitOpen {
        platform: Platform,
        retry_after: Duration,
    },

    #[error("{platform} request queue is full ({in_flight} in flight, {queued}/{max_queue} queued)")]
    QueueFull {
        platform: Platform,
        in_flight: usize,
        queued: usize,
        max_queue: usize,
    },

    #[error("{0}")]
    RateLimited(RateLimitRejection),

    #[error("{0}")]
    BandwidthExceeded(BandwidthRejection),

    #[error("no adapter registered for platform '{0}'")]
    AdapterNotRegistered(Platform),
}

impl PipelineError {
    pub fn from_source(platform: Platform, source: SourceError) -> Self {
        Self::Source { platform, source }
    }

    /// Stable dotted code exposed on the boundary response.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(error) => error.code(),
            Self::Source { source, .. } => source.code(),
            Self::CircuitOpen { .. } => "resilience.circuit_open",
            Self::QueueFull { .. } => "resilience.queue_full",
            Self::RateLimited(_) => "admission.rate_limited",
            Self::BandwidthExceeded(_) => "admission.bandwidth_exceeded",
            Self::AdapterNotRegistered(_) => "pipeline.adapter_not_registered",
        }
    }

    /// Whether a caller may reasonably try the same lookup again later.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::AdapterNotRegistered(_) => false,
            Self::Source { source, .. } => {
                source.retryable() || source.kind() == SourceErrorKind::PoolExhausted
            }
            Self::CircuitOpen { .. }
            | Self::QueueFull { .. }
            | Self::RateLimited(_)
            | Self::BandwidthExceeded(_) => true,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            Self::RateLimited(rejection) => Some(rejection.retry_after),
            Self::BandwidthExceeded(rejection) => Some(rejection.retry_after),
            _ => None,
        }
    }

    pub fn source_kind(&self) -> Option<SourceErrorKind> {
        match self {
            Self::Source { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
