use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cpstats_core::{
    AdapterFuture, AdapterStrategy, CacheMode, CallerContext, CircuitState, CodeforcesAdapter,
    HttpClient, HttpFuture, HttpRequest, HttpResponse, LookupTarget, Platform, PlatformPolicy,
    ProfileReference, Rank, RawSourceRecord, SourceAdapter, SourceError, SpanResult,
    StatsPipeline,
};

// ============================================================================
// Test doubles
// ============================================================================

struct ScriptedHttpClient {
    responses: Vec<(&'static str, HttpResponse)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    fn new(responses: Vec<(&'static str, HttpResponse)>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let response = self
            .responses
            .iter()
            .find(|(pattern, _)| request.url.contains(pattern))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| HttpResponse::new(404, "{}"));
        self.requests.lock().expect("lock").push(request);
        Box::pin(async move { Ok(response) })
    }
}

/// Adapter whose every call fails with the same error.
struct FailingAdapter {
    platform: Platform,
    error: SourceError,
    calls: AtomicUsize,
}

impl FailingAdapter {
    fn new(platform: Platform, error: SourceError) -> Arc<Self> {
        Arc::new(Self {
            platform,
            error,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceAdapter for FailingAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::Api
    }

    fn fetch<'a>(&'a self, _username: &'a str) -> AdapterFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let error = self.error.clone();
        Box::pin(async move { Err(error) })
    }
}

/// Adapter answering with a fixed GitHub-style record.
struct StaticAdapter {
    calls: AtomicUsize,
}

impl SourceAdapter for StaticAdapter {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::Api
    }

    fn fetch<'a>(&'a self, username: &'a str) -> AdapterFuture<'a> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
        Box::pin(async move {
            Ok(RawSourceRecord::success()
                .with_field("login", username)
                .with_field("followers", 10 + call))
        })
    }
}

fn codeforces_upstream() -> Arc<ScriptedHttpClient> {
    ScriptedHttpClient::new(vec![
        (
            "user.info",
            HttpResponse::ok(
                r#"{"status":"OK","result":[{"handle":"tourist","rating":3979,"maxRating":4009,
                "rank":"legendary grandmaster","maxRank":"legendary grandmaster","contribution":150}]}"#,
            ),
        ),
        (
            "user.status",
            HttpResponse::ok(
                r#"{"status":"OK","result":[
                {"problem":{"contestId":1,"index":"A","name":"Theatre Square"},"verdict":"OK"},
                {"problem":{"contestId":1,"index":"A","name":"Theatre Square"},"verdict":"OK"},
                {"problem":{"contestId":4,"index":"A","name":"Watermelon"},"verdict":"OK"},
                {"problem":{"contestId":4,"index":"B","name":"Before an Exam"},"verdict":"WRONG_ANSWER"}]}"#,
            ),
        ),
    ])
}

fn no_retry_policy(platform: Platform) -> PlatformPolicy {
    let mut policy = PlatformPolicy::default_for(platform);
    policy.retry_backoff.max_retries = 0;
    policy
}

// ============================================================================
// Detection and normalization
// ============================================================================

#[tokio::test]
async fn codeforces_url_is_detected_fetched_and_normalized() {
    // Given: a pipeline whose Codeforces adapter talks to a scripted upstream
    let upstream = codeforces_upstream();
    let pipeline = StatsPipeline::builder()
        .adapter(Arc::new(CodeforcesAdapter::with_http_client(
            Arc::clone(&upstream) as Arc<dyn HttpClient>,
        )))
        .build()
        .expect("pipeline builds");

    // When: the caller looks up a profile URL
    let response = pipeline
        .lookup(
            &CallerContext::local(),
            LookupTarget::Url(String::from("https://codeforces.com/profile/tourist")),
            CacheMode::Use,
        )
        .await;

    // Then: the canonical profile comes back fresh
    assert!(response.success, "lookup failed: {:?}", response.error);
    assert!(!response.is_from_cache());
    let profile = response.data.expect("profile");
    assert_eq!(profile.platform, Platform::Codeforces);
    assert_eq!(profile.username, "tourist");
    assert_eq!(profile.rating, 3979);
    assert_eq!(profile.total_solved, 2);
    assert_eq!(
        profile.rank,
        Some(Rank::Label(String::from("legendary grandmaster")))
    );

    let value = serde_json::to_value(&profile).expect("serializes");
    assert_eq!(value["maxRating"], 4009);
    assert_eq!(value["contribution"], 150);

    // And: the trace records every stage under the returned id
    let trace = pipeline.trace(&response.trace_id).expect("trace retained");
    assert_eq!(
        trace.operations(),
        vec!["lookup", "admission", "detect", "cache.read", "source.fetch", "normalize"]
    );
    assert!(trace.spans.iter().all(|span| span.result == SpanResult::Ok));
    assert_eq!(upstream.request_count(), 2);
}

#[tokio::test]
async fn unsupported_url_fails_detection_without_touching_adapters() {
    // Given: a pipeline with an adapter that would fail loudly if called
    let adapter = FailingAdapter::new(Platform::GitHub, SourceError::server("unused"));
    let pipeline = StatsPipeline::builder()
        .adapter(adapter.clone())
        .build()
        .expect("pipeline builds");

    // When: the URL belongs to no supported platform
    let response = pipeline
        .lookup(
            &CallerContext::local(),
            LookupTarget::Url(String::from("https://example.com/u/someone")),
            CacheMode::Use,
        )
        .await;

    // Then: detection fails with a stable code and no adapter call
    assert!(!response.success);
    let error = response.error.expect("error payload");
    assert_eq!(error.code, "detect.unsupported_platform");
    assert!(!error.retryable);
    assert_eq!(adapter.calls(), 0);
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn second_lookup_within_ttl_is_served_from_cache() {
    // Given: a pipeline that already served one lookup
    let adapter = Arc::new(StaticAdapter {
        calls: AtomicUsize::new(0),
    });
    let pipeline = StatsPipeline::builder()
        .adapter(adapter.clone())
        .build()
        .expect("pipeline builds");
    let reference = ProfileReference::new(Platform::GitHub, "Octocat").expect("reference");
    let first = pipeline
        .lookup(&CallerContext::local(), reference.clone().into(), CacheMode::Use)
        .await;
    assert!(first.success);
    assert!(!first.is_from_cache());

    // When: the same profile is requested again, in different case
    let second = pipeline
        .lookup(
            &CallerContext::local(),
            LookupTarget::Url(String::from("https://github.com/octocat")),
            CacheMode::Use,
        )
        .await;

    // Then: the cached profile is returned with no adapter call
    assert!(second.success);
    assert!(second.is_from_cache());
    assert_eq!(second.data, first.data);
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    assert_ne!(second.trace_id, first.trace_id);

    // And: a refresh goes upstream again and replaces the entry
    let refreshed = pipeline
        .lookup(&CallerContext::local(), reference.clone().into(), CacheMode::Refresh)
        .await;
    assert!(!refreshed.is_from_cache());
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    let cached = pipeline
        .lookup(&CallerContext::local(), reference.into(), CacheMode::Use)
        .await;
    assert!(cached.is_from_cache());
    assert_eq!(cached.data, refreshed.data);
}

#[tokio::test]
async fn invalidated_profile_is_fetched_again() {
    // Given: a cached profile
    let adapter = Arc::new(StaticAdapter {
        calls: AtomicUsize::new(0),
    });
    let pipeline = StatsPipeline::builder()
        .adapter(adapter.clone())
        .build()
        .expect("pipeline builds");
    let reference = ProfileReference::new(Platform::GitHub, "octocat").expect("reference");
    pipeline
        .lookup(&CallerContext::local(), reference.clone().into(), CacheMode::Use)
        .await;
    assert_eq!(pipeline.cached_entries().await, 1);

    // When: the entry is invalidated
    assert!(pipeline.invalidate(&reference).await);

    // Then: the next lookup reaches the adapter
    let response = pipeline
        .lookup(&CallerContext::local(), reference.into(), CacheMode::Use)
        .await;
    assert!(!response.is_from_cache());
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Circuit breaking
// ============================================================================

#[tokio::test]
async fn five_consecutive_failures_open_the_circuit() {
    // Given: a LeetCode adapter whose upstream keeps failing, without retries
    let adapter = FailingAdapter::new(Platform::LeetCode, SourceError::server("502 bad gateway"));
    let pipeline = StatsPipeline::builder()
        .adapter(adapter.clone())
        .policy(no_retry_policy(Platform::LeetCode))
        .build()
        .expect("pipeline builds");
    let caller = CallerContext::local();
    let target = || LookupTarget::Url(String::from("https://leetcode.com/u/ghost"));

    // When: five lookups fail upstream
    for attempt in 0..5 {
        let response = pipeline.lookup(&caller, target(), CacheMode::Use).await;
        let error = response.error.expect("error payload");
        assert_eq!(error.code, "source.server_error", "attempt {attempt}");
        assert!(error.retryable);
    }

    // Then: the sixth is rejected by the breaker without reaching the adapter
    let response = pipeline.lookup(&caller, target(), CacheMode::Use).await;
    let error = response.error.expect("error payload");
    assert_eq!(error.code, "resilience.circuit_open");
    assert!(error.retry_after_ms.is_some_and(|delay| delay > 0));
    assert_eq!(adapter.calls(), 5);

    let snapshot = pipeline.snapshot(Platform::LeetCode).expect("snapshot");
    assert_eq!(snapshot.circuit, CircuitState::Open);

    // And: other platforms are unaffected
    let github = pipeline.snapshot(Platform::GitHub).expect("snapshot");
    assert_eq!(github.circuit, CircuitState::Closed);
}

#[tokio::test]
async fn retries_happen_inside_one_breaker_count() {
    // Given: a failing adapter with one retry allowed
    let mut policy = PlatformPolicy::default_for(Platform::Codeforces);
    policy.retry_backoff.max_retries = 1;
    policy.retry_backoff.initial_delay = std::time::Duration::from_millis(10);
    policy.retry_backoff.max_delay = std::time::Duration::from_millis(10);
    let adapter = FailingAdapter::new(Platform::Codeforces, SourceError::network("reset"));
    let pipeline = StatsPipeline::builder()
        .adapter(adapter.clone())
        .policy(policy)
        .build()
        .expect("pipeline builds");

    // When: one lookup fails after its retry
    let response = pipeline
        .lookup(
            &CallerContext::local(),
            ProfileReference::parse("codeforces:petr")
                .expect("reference")
                .into(),
            CacheMode::Use,
        )
        .await;

    // Then: the adapter saw two attempts but the breaker one failure
    assert_eq!(response.error.expect("error").code, "source.network_error");
    assert_eq!(adapter.calls(), 2);
    let snapshot = pipeline.snapshot(Platform::Codeforces).expect("snapshot");
    assert_eq!(snapshot.consecutive_failures, 1);

    let trace = pipeline.trace(&response.trace_id).expect("trace");
    let fetch = trace
        .spans
        .iter()
        .find(|span| span.operation == "source.fetch")
        .expect("fetch span");
    assert_eq!(fetch.metadata.get("attempts").map(String::as_str), Some("2"));
}
