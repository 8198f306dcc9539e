//! Source adapter contract and error classification.
//!
//! Every platform is served by one [`SourceAdapter`]. Adapters come in two
//! strategies:
//!
//! | Strategy | Used by | Transport |
//! |----------|---------|-----------|
//! | [`AdapterStrategy::Api`] | LeetCode, Codeforces, GitHub | structured HTTP endpoints |
//! | [`AdapterStrategy::Browser`] | CodeChef, AtCoder | rendered HTML + extractor chains |
//!
//! Adapters only fetch. They never retry, cache or trip breakers themselves;
//! that is the job of [`crate::resilience`] and [`crate::pipeline`].

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::domain::RawSourceRecord;
use crate::platform::Platform;

/// How an adapter obtains its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStrategy {
    Api,
    Browser,
}

impl AdapterStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Browser => "browser",
        }
    }
}

impl Display for AdapterStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorKind {
    /// The upstream served a block/anti-bot page.
    Blocked,
    NotFound,
    Timeout,
    Network,
    ParseFailure,
    /// 5xx from the upstream.
    Server,
    /// 429 or an explicit upstream rate-limit signal.
    RateLimited,
    /// 401/403 from an API endpoint.
    Unauthorized,
    /// Any other 4xx.
    ClientError,
    /// No rendering slot became free in time.
    PoolExhausted,
}

impl SourceErrorKind {
    /// Transient classes that the resilience layer retries with backoff.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Server | Self::RateLimited
        )
    }
}

/// Structured error returned by source adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    status: Option<u16>,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Blocked, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Network, message)
    }

    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::ParseFailure, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Server, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unauthorized, message)
    }

    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::PoolExhausted, message)
    }

    /// Classifies a non-2xx HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 | 410 => SourceErrorKind::NotFound,
            401 | 403 => SourceErrorKind::Unauthorized,
            429 => SourceErrorKind::RateLimited,
            500..=599 => SourceErrorKind::Server,
            _ => SourceErrorKind::ClientError,
        };
        Self::new(kind, message).with_status(status)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Blocked => "source.blocked",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Network => "source.network_error",
            SourceErrorKind::ParseFailure => "source.parse_failure",
            SourceErrorKind::Server => "source.server_error",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Unauthorized => "source.unauthorized",
            SourceErrorKind::ClientError => "source.client_error",
            SourceErrorKind::PoolExhausted => "source.pool_exhausted",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

pub type AdapterFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawSourceRecord, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations must be `Send + Sync`; one instance serves every lookup
/// for its platform.
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn strategy(&self) -> AdapterStrategy;

    /// Fetches raw statistics for `username`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`]; the caller decides whether the
    /// kind is worth retrying.
    fn fetch<'a>(&'a self, username: &'a str) -> AdapterFuture<'a>;
}
