//! Lookup orchestration.
//!
//! One [`StatsPipeline::lookup`] runs these stages, each recorded as a span
//! of the lookup's trace:
//!
//! | Stage | Span | Fails with |
//! |-------|------|------------|
//! | caller governors | `admission` | `RateLimited`, `BandwidthExceeded` |
//! | reference resolution | `detect` | `UnsupportedPlatform`, `InvalidReference` |
//! | cache read | `cache.read` | never |
//! | adapter call under resilience | `source.fetch` | `CircuitOpen`, `QueueFull`, source errors |
//! | normalization | `normalize` | `InvalidInput` |
//!
//! Concurrent lookups of the same profile are not coalesced; each one that
//! misses the cache reaches the adapter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::default_adapters;
use crate::admission::{AdaptiveRateLimiter, BandwidthLedger};
use crate::cache::{CacheMode, CacheStore};
use crate::config::{ConfigError, PipelineConfig};
use crate::domain::NormalizedProfile;
use crate::envelope::LookupResponse;
use crate::error::PipelineError;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::normalize::normalize;
use crate::platform::{detect, Platform, ProfileReference};
use crate::policy::PlatformPolicy;
use crate::render::{HttpRenderBackend, RenderPool};
use crate::resilience::{ResilienceController, ResilienceSnapshot};
use crate::source::SourceAdapter;
use crate::trace::{PipelineTrace, SpanId, SpanResult, TraceId, Tracer};

/// Payload size assumed by the bandwidth pre-check before the real size is
/// known.
pub const ESTIMATED_PROFILE_BYTES: u64 = 2 * 1024;

/// Who is asking. The ip keys both caller governors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub ip: String,
}

impl CallerContext {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }

    /// Caller used by in-process tools such as the CLI.
    pub fn local() -> Self {
        Self::new("127.0.0.1")
    }
}

/// What to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTarget {
    Url(String),
    Reference(ProfileReference),
}

impl LookupTarget {
    fn resolve(&self) -> Result<ProfileReference, PipelineError> {
        match self {
            Self::Url(url) => Ok(detect(url)?),
            Self::Reference(reference) => Ok(reference.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Reference(reference) => reference.to_string(),
        }
    }
}

impl From<ProfileReference> for LookupTarget {
    fn from(reference: ProfileReference) -> Self {
        Self::Reference(reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fetched {
    from_cache: bool,
}

struct PipelineInner {
    adapters: HashMap<Platform, Arc<dyn SourceAdapter>>,
    controllers: HashMap<Platform, ResilienceController>,
    cache: CacheStore<NormalizedProfile>,
    tracer: Tracer,
    rate_limiter: AdaptiveRateLimiter,
    bandwidth: BandwidthLedger,
}

/// Profile ingestion pipeline.
///
/// Holds one adapter and one [`ResilienceController`] per platform plus the
/// shared cache, tracer and caller governors.
pub struct StatsPipeline {
    inner: Arc<PipelineInner>,
    maintenance_interval: Duration,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StatsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut platforms: Vec<_> = self.inner.adapters.keys().copied().collect();
        platforms.sort();
        f.debug_struct("StatsPipeline")
            .field("platforms", &platforms)
            .field("maintenance_interval", &self.maintenance_interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl StatsPipeline {
    pub fn builder() -> StatsPipelineBuilder {
        StatsPipelineBuilder::default()
    }

    /// Production wiring: reqwest transport, HTTP render backend and the
    /// five platform adapters.
    pub fn from_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        let user_agent = config.surface_options().user_agent;
        let http_client: Arc<dyn HttpClient> =
            Arc::new(ReqwestHttpClient::with_user_agent(&user_agent));
        let render_pool = RenderPool::new(
            Arc::new(HttpRenderBackend::new(Arc::clone(&http_client))),
            config.render.pool_config(),
            config.surface_options(),
        );
        let adapters = default_adapters(http_client, render_pool, config.http.github_token.clone());

        Self::builder().config(config).adapters(adapters).build()
    }

    /// Resolves `target` and returns its normalized profile as a boundary
    /// response. Never panics and never returns a bare error: failures are
    /// encoded in the response with the trace id.
    pub async fn lookup(
        &self,
        caller: &CallerContext,
        target: LookupTarget,
        mode: CacheMode,
    ) -> LookupResponse {
        let description = target.describe();
        let (trace_id, root) = self.inner.tracer.start_trace(
            "lookup",
            [("ip", caller.ip.as_str()), ("target", description.as_str())],
        );

        match self.run(caller, &target, mode, &trace_id).await {
            Ok((profile, fetched)) => {
                self.inner.tracer.end_span(&trace_id, root, SpanResult::Ok);
                info!(
                    trace_id = %trace_id,
                    platform = %profile.platform,
                    username = %profile.username,
                    from_cache = fetched.from_cache,
                    "lookup succeeded"
                );
                LookupResponse::success(profile, fetched.from_cache, trace_id)
            }
            Err(error) => {
                self.inner
                    .tracer
                    .end_span(&trace_id, root, SpanResult::error(error.code()));
                warn!(
                    trace_id = %trace_id,
                    target = %description,
                    code = error.code(),
                    error = %error,
                    "lookup failed"
                );
                LookupResponse::failure(&error, trace_id)
            }
        }
    }

    async fn run(
        &self,
        caller: &CallerContext,
        target: &LookupTarget,
        mode: CacheMode,
        trace_id: &TraceId,
    ) -> Result<(NormalizedProfile, Fetched), PipelineError> {
        let inner = &self.inner;

        self.stage(trace_id, "admission", [("ip", caller.ip.as_str())], async {
            inner.rate_limiter.check(&caller.ip).map_err(|rejection| {
                debug!(trace_id = %trace_id, ip = %caller.ip, "rate limit rejection");
                PipelineError::RateLimited(rejection)
            })?;
            inner
                .bandwidth
                .check(&caller.ip, ESTIMATED_PROFILE_BYTES)
                .map_err(PipelineError::BandwidthExceeded)
        })
        .await?;

        let reference = self
            .stage(trace_id, "detect", [("mode", mode_name(mode))], async {
                target.resolve()
            })
            .await?;
        let platform = reference.platform();
        let username = reference.username();
        let key = reference.cache_key();

        if mode.reads() {
            let cached = self
                .stage(trace_id, "cache.read", [("key", key.as_str())], async {
                    Ok(inner.cache.get(&key).await)
                })
                .await?;
            if let Some(profile) = cached {
                debug!(trace_id = %trace_id, %platform, username, "cache hit");
                self.record_bandwidth(caller, &profile);
                return Ok((profile, Fetched { from_cache: true }));
            }
            debug!(trace_id = %trace_id, %platform, username, "cache miss");
        }

        let adapter = inner
            .adapters
            .get(&platform)
            .ok_or(PipelineError::AdapterNotRegistered(platform))?;
        let controller = inner
            .controllers
            .get(&platform)
            .ok_or(PipelineError::AdapterNotRegistered(platform))?;

        let fetch_span = inner.tracer.add_span(
            trace_id,
            "source.fetch",
            [("platform", platform.as_str()), ("username", username)],
        );
        let mut attempts = 0_u32;
        let fetched = controller
            .execute(|attempt| {
                attempts = attempt + 1;
                adapter.fetch(username)
            })
            .await;
        if let Some(span) = fetch_span {
            inner
                .tracer
                .annotate(trace_id, span, "attempts", attempts.to_string());
            self.finish_span(trace_id, span, &fetched);
        }
        let raw = fetched?;
        if let Some(diagnostic) = raw.diagnostic.as_deref() {
            debug!(trace_id = %trace_id, %platform, username, diagnostic, "adapter diagnostic");
        }

        let profile = self
            .stage(trace_id, "normalize", [("platform", platform.as_str())], async {
                Ok(normalize(platform, username, &raw)?)
            })
            .await?;

        if mode.writes() {
            inner.cache.put(key, profile.clone(), None).await;
        }
        self.record_bandwidth(caller, &profile);
        Ok((profile, Fetched { from_cache: false }))
    }

    async fn stage<T, Fut, const N: usize>(
        &self,
        trace_id: &TraceId,
        operation: &str,
        metadata: [(&str, &str); N],
        work: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let span = self.inner.tracer.add_span(trace_id, operation, metadata);
        let result = work.await;
        if let Some(span) = span {
            self.finish_span(trace_id, span, &result);
        }
        result
    }

    fn finish_span<T>(&self, trace_id: &TraceId, span: SpanId, result: &Result<T, PipelineError>) {
        let outcome = match result {
            Ok(_) => SpanResult::Ok,
            Err(error) => SpanResult::error(error.code()),
        };
        self.inner.tracer.end_span(trace_id, span, outcome);
    }

    fn record_bandwidth(&self, caller: &CallerContext, profile: &NormalizedProfile) {
        let bytes = serde_json::to_vec(profile).map_or(ESTIMATED_PROFILE_BYTES, |body| body.len() as u64);
        self.inner.bandwidth.record(&caller.ip, bytes);
    }

    /// Starts the periodic cache, trace and governor sweeps. Calling it
    /// while the sweeps already run is a no-op. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> bool {
        let mut maintenance = self
            .maintenance
            .lock()
            .expect("maintenance handle lock is not poisoned");
        if maintenance.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let inner = Arc::downgrade(&self.inner);
        *maintenance = Some(tokio::spawn(run_maintenance(inner, self.maintenance_interval)));
        info!(
            interval_ms = self.maintenance_interval.as_millis() as u64,
            "pipeline maintenance started"
        );
        true
    }

    /// Stops the background sweeps. Safe to call repeatedly.
    pub fn stop(&self) -> bool {
        let handle = self
            .maintenance
            .lock()
            .expect("maintenance handle lock is not poisoned")
            .take();
        match handle {
            Some(handle) => {
                handle.abort();
                info!("pipeline maintenance stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.maintenance
            .lock()
            .expect("maintenance handle lock is not poisoned")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Runs one sweep immediately; returns the number of removed cache
    /// entries and traces.
    pub async fn sweep(&self) -> (usize, usize) {
        sweep_once(&self.inner).await
    }

    pub fn snapshot(&self, platform: Platform) -> Option<ResilienceSnapshot> {
        self.inner
            .controllers
            .get(&platform)
            .map(ResilienceController::snapshot)
    }

    pub fn snapshots(&self) -> Vec<ResilienceSnapshot> {
        Platform::ALL
            .into_iter()
            .filter_map(|platform| self.snapshot(platform))
            .collect()
    }

    pub fn trace(&self, trace_id: &TraceId) -> Option<PipelineTrace> {
        self.inner.tracer.get(trace_id)
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.inner.adapters.contains_key(&platform)
    }

    pub async fn invalidate(&self, reference: &ProfileReference) -> bool {
        self.inner.cache.invalidate(&reference.cache_key()).await
    }

    pub async fn cached_entries(&self) -> usize {
        self.inner.cache.len().await
    }
}

impl Drop for StatsPipeline {
    fn drop(&mut self) {
        if let Ok(mut maintenance) = self.maintenance.lock() {
            if let Some(handle) = maintenance.take() {
                handle.abort();
            }
        }
    }
}

async fn run_maintenance(inner: Weak<PipelineInner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        sweep_once(&inner).await;
    }
}

async fn sweep_once(inner: &PipelineInner) -> (usize, usize) {
    let expired = inner.cache.clear_expired().await;
    let traces = inner.tracer.cleanup();
    let callers = inner.rate_limiter.cleanup();
    let ledgers = inner.bandwidth.cleanup();
    debug!(
        expired_cache_entries = expired,
        expired_traces = traces,
        idle_callers = callers,
        idle_ledgers = ledgers,
        "maintenance sweep"
    );
    (expired, traces)
}

const fn mode_name(mode: CacheMode) -> &'static str {
    match mode {
        CacheMode::Use => "use",
        CacheMode::Refresh => "refresh",
        CacheMode::Bypass => "bypass",
    }
}

/// Assembles a [`StatsPipeline`] from a config and explicit adapters.
#[derive(Default)]
pub struct StatsPipelineBuilder {
    config: PipelineConfig,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    policies: HashMap<Platform, PlatformPolicy>,
}

impl StatsPipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers `adapter` for its platform, replacing any earlier one.
    pub fn adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn adapters(mut self, adapters: impl IntoIterator<Item = Arc<dyn SourceAdapter>>) -> Self {
        self.adapters.extend(adapters);
        self
    }

    /// Replaces the configured policy for `policy.platform`.
    pub fn policy(mut self, policy: PlatformPolicy) -> Self {
        self.policies.insert(policy.platform, policy);
        self
    }

    pub fn build(self) -> Result<StatsPipeline, ConfigError> {
        let config = self.config;
        config.validate()?;

        let adapters: HashMap<Platform, Arc<dyn SourceAdapter>> = self
            .adapters
            .into_iter()
            .map(|adapter| (adapter.platform(), adapter))
            .collect();

        let controllers = Platform::ALL
            .into_iter()
            .map(|platform| {
                let policy = self
                    .policies
                    .get(&platform)
                    .cloned()
                    .unwrap_or_else(|| config.policy_for(platform));
                (platform, ResilienceController::from_policy(&policy))
            })
            .collect();

        let cache = if config.cache.enabled {
            CacheStore::new(config.cache_ttl())
        } else {
            CacheStore::disabled()
        };

        Ok(StatsPipeline {
            inner: Arc::new(PipelineInner {
                adapters,
                controllers,
                cache,
                tracer: Tracer::new(config.trace_retention()),
                rate_limiter: AdaptiveRateLimiter::new(config.rate_limit.to_config()),
                bandwidth: BandwidthLedger::new(config.bandwidth.to_config()),
            }),
            maintenance_interval: config.maintenance_interval(),
            maintenance: Mutex::new(None),
        })
    }
}
