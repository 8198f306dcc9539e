//! # cpstats Core
//!
//! Ingestion pipeline for competitive-programming profile statistics.
//!
//! ## Overview
//!
//! Given a profile URL or a `(platform, username)` pair, the pipeline:
//!
//! - **Detects** the platform and username from the reference
//! - **Admits** the caller through an adaptive rate limiter and a bandwidth ledger
//! - **Serves** fresh results from a TTL cache
//! - **Fetches** raw statistics through a per-platform source adapter, wrapped in
//!   a circuit breaker, bounded concurrency with a FIFO queue, retries with
//!   exponential backoff and a hard call timeout
//! - **Normalizes** the raw record into one canonical [`NormalizedProfile`]
//! - **Traces** every stage under a correlation id returned on the response
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | LeetCode, Codeforces, GitHub, CodeChef and AtCoder adapters |
//! | [`admission`] | Adaptive rate limiter and bandwidth ledger |
//! | [`backpressure`] | Bounded concurrency with a bounded FIFO wait queue |
//! | [`cache`] | TTL cache keyed by `platform:username` |
//! | [`circuit_breaker`] | Consecutive-failure circuit breaker |
//! | [`config`] | TOML and environment configuration |
//! | [`domain`] | Raw and normalized profile records |
//! | [`envelope`] | Boundary response shape |
//! | [`error`] | Validation and pipeline error taxonomy |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`normalize`] | Raw-to-canonical normalization |
//! | [`pipeline`] | Lookup orchestration and lifecycle |
//! | [`platform`] | Platform identifiers and reference detection |
//! | [`policy`] | Per-platform resilience defaults |
//! | [`render`] | Bounded render pool and DOM extraction for API-less sites |
//! | [`resilience`] | Per-platform resilience controller |
//! | [`retry`] | Backoff schedule and retry classification |
//! | [`source`] | Adapter trait and source error taxonomy |
//! | [`trace`] | Request-scoped span recorder |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cpstats_core::{CacheMode, CallerContext, LookupTarget, PipelineConfig, StatsPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = StatsPipeline::from_config(PipelineConfig::load(None)?)?;
//!     pipeline.start();
//!
//!     let response = pipeline
//!         .lookup(
//!             &CallerContext::local(),
//!             LookupTarget::Url("https://codeforces.com/profile/tourist".into()),
//!             CacheMode::Use,
//!         )
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!
//!     pipeline.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Admission      │────▶│ Rate / Bandwidth │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Detect + Cache │────▶│ CacheStore (TTL) │
//! └────────┬────────┘     └──────────────────┘
//!          │ miss
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Resilience     │────▶│ Breaker / Queue  │
//! │  Controller     │     │ Retry / Timeout  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Source Adapter  │────▶│ HTTP / RenderPool│
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  Normalizer     │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every failure surfaces as a [`PipelineError`] with a stable dotted code:
//!
//! ```rust
//! use cpstats_core::{SourceError, SourceErrorKind};
//!
//! fn handle_error(error: SourceError) {
//!     match error.kind() {
//!         SourceErrorKind::RateLimited | SourceErrorKind::Server => {
//!             // Transient: the resilience controller already retried
//!         }
//!         SourceErrorKind::NotFound => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - The GitHub token is read from the environment only and never serialized
//! - Caller ips are only kept in memory, for the admission windows

pub mod adapters;
pub mod admission;
pub mod backpressure;
pub mod cache;
pub mod circuit_breaker;
mod clock;
pub mod config;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod http_client;
pub mod normalize;
pub mod pipeline;
pub mod platform;
pub mod policy;
pub mod render;
pub mod resilience;
pub mod retry;
pub mod source;
pub mod trace;

// Adapter implementations
pub use adapters::{
    default_adapters, AtCoderAdapter, CodeChefAdapter, CodeforcesAdapter, GitHubAdapter,
    LeetCodeAdapter,
};

// Admission governors
pub use admission::{
    AdaptiveRateLimiter, BandwidthConfig, BandwidthLedger, BandwidthRejection, BandwidthScope,
    RateLimitConfig, RateLimitDecision, RateLimitRejection,
};

// Backpressure
pub use backpressure::{BackpressureGate, BackpressurePermit, BackpressureSnapshot, QueueFull};

// Caching
pub use cache::{CacheMode, CacheStore, DEFAULT_CACHE_TTL};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitDecision, CircuitState};

// Configuration
pub use config::{ConfigError, PipelineConfig, PlatformOverride};

// Domain models
pub use domain::{
    AtCoderStats, CodeChefStats, CodeforcesStats, GitHubStats, LeetCodeStats, NormalizedProfile,
    PlatformStats, Rank, RawSourceRecord, RecordStatus,
};

// Envelope types
pub use envelope::{LookupResponse, ResponseError};

// Error types
pub use error::{PipelineError, ValidationError};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpMethod, HttpRequest,
    HttpResponse, ReqwestHttpClient,
};

// Normalization
pub use normalize::{normalize, Normalizer};

// Pipeline
pub use pipeline::{CallerContext, LookupTarget, StatsPipeline, StatsPipelineBuilder};

// Platform detection
pub use platform::{detect, Platform, ProfileReference, DETECTION_ORDER};

// Policies
pub use policy::{BackoffPolicy, PlatformPolicy};

// Rendering
pub use render::{
    inspect_page, HttpRenderBackend, RenderBackend, RenderPool, RenderPoolConfig, RenderSurface,
    RenderedPage, SurfaceOptions,
};

// Resilience
pub use resilience::{ResilienceController, ResilienceSnapshot};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Source adapter contract
pub use source::{AdapterFuture, AdapterStrategy, SourceAdapter, SourceError, SourceErrorKind};

// Tracing
pub use trace::{PipelineTrace, Span, SpanId, SpanResult, TraceId, Tracer};
