use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cpstats_core::{
    AdapterFuture, AdapterStrategy, CacheMode, CallerContext, LookupTarget, PipelineConfig,
    Platform, RawSourceRecord, SourceAdapter, SpanResult, StatsPipeline,
};
use serde_json::json;

struct CountingAdapter {
    calls: AtomicUsize,
}

impl CountingAdapter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceAdapter for CountingAdapter {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::Api
    }

    fn fetch<'a>(&'a self, username: &'a str) -> AdapterFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Ok(RawSourceRecord::success()
                .with_field("login", username)
                .with_field("publicRepos", 8))
        })
    }
}

fn pipeline(config: &str, adapter: &Arc<CountingAdapter>) -> StatsPipeline {
    let config = PipelineConfig::from_toml_str(config).expect("config parses");
    StatsPipeline::builder()
        .config(config)
        .adapter(Arc::clone(adapter) as Arc<dyn SourceAdapter>)
        .build()
        .expect("pipeline builds")
}

fn octocat() -> LookupTarget {
    LookupTarget::Url(String::from("https://github.com/octocat"))
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn caller_over_quota_is_rejected_with_retry_after() {
    // Given: a quota of two lookups per minute
    let adapter = CountingAdapter::new();
    let pipeline = pipeline(
        r#"
        [rate_limit]
        base_quota = 2
        floor = 1
        "#,
        &adapter,
    );
    let caller = CallerContext::new("203.0.113.7");

    // When: the caller makes three lookups
    for _ in 0..2 {
        let response = pipeline.lookup(&caller, octocat(), CacheMode::Bypass).await;
        assert!(response.success, "within quota: {:?}", response.error);
    }
    let rejected = pipeline.lookup(&caller, octocat(), CacheMode::Bypass).await;

    // Then: the third is refused before detection with a retry hint
    let value = serde_json::to_value(&rejected).expect("serializes");
    assert_eq!(value["success"], json!(false));
    assert_eq!(value["error"]["code"], json!("admission.rate_limited"));
    assert_eq!(value["error"]["retryable"], json!(true));
    let retry_after_ms = value["error"]["retryAfterMs"].as_u64().expect("retryAfterMs");
    assert!(retry_after_ms > 0 && retry_after_ms <= 60_000);
    assert_eq!(adapter.calls(), 2);

    let trace = pipeline.trace(&rejected.trace_id).expect("trace");
    assert_eq!(trace.operations(), vec!["lookup", "admission"]);
    assert_eq!(
        trace.spans[1].result,
        SpanResult::error("admission.rate_limited")
    );

    // And: another caller keeps its own quota
    let other = pipeline
        .lookup(&CallerContext::new("198.51.100.1"), octocat(), CacheMode::Bypass)
        .await;
    assert!(other.success);
}

#[tokio::test]
async fn repeated_violations_block_the_caller() {
    // Given: one lookup per window and a block after two violations
    let adapter = CountingAdapter::new();
    let pipeline = pipeline(
        r#"
        [rate_limit]
        base_quota = 1
        floor = 1
        violation_suspicion = 1
        block_threshold = 2
        block_duration_secs = 900
        "#,
        &adapter,
    );
    let caller = CallerContext::new("203.0.113.9");
    assert!(pipeline.lookup(&caller, octocat(), CacheMode::Use).await.success);

    // When: the caller keeps going over quota
    let first_violation = pipeline.lookup(&caller, octocat(), CacheMode::Use).await;
    let second_violation = pipeline.lookup(&caller, octocat(), CacheMode::Use).await;

    // Then: the second violation turns into a block lasting the block duration
    let first = first_violation.error.expect("rejected");
    assert!(!first.message.contains("blocked"), "{}", first.message);
    let blocked = second_violation.error.expect("rejected");
    assert_eq!(blocked.code, "admission.rate_limited");
    assert!(blocked.message.contains("blocked"), "{}", blocked.message);
    assert_eq!(blocked.retry_after_ms, Some(900_000));

    // And: even cached profiles are refused while blocked
    let still_blocked = pipeline.lookup(&caller, octocat(), CacheMode::Use).await;
    assert!(!still_blocked.success);
    assert_eq!(adapter.calls(), 1);
}

// ============================================================================
// Bandwidth
// ============================================================================

#[tokio::test]
async fn caller_over_bandwidth_ceiling_is_rejected() {
    // Given: a per-minute ceiling just above one estimated profile
    let adapter = CountingAdapter::new();
    let pipeline = pipeline(
        r#"
        [bandwidth]
        per_ip_minute_bytes = 2100
        "#,
        &adapter,
    );
    let caller = CallerContext::new("192.0.2.44");
    let first = pipeline.lookup(&caller, octocat(), CacheMode::Use).await;
    assert!(first.success, "{:?}", first.error);

    // When: the same caller asks again inside the minute
    let second = pipeline.lookup(&caller, octocat(), CacheMode::Use).await;

    // Then: the transfer would cross the ceiling and is refused
    let error = second.error.expect("rejected");
    assert_eq!(error.code, "admission.bandwidth_exceeded");
    assert!(error.retryable);
    assert!(error.message.contains("per-ip minute"), "{}", error.message);
    assert!(error.retry_after_ms.is_some_and(|delay| delay > 0 && delay <= 60_000));

    // And: a different caller is unaffected and reads the cache
    let other = pipeline
        .lookup(&CallerContext::new("192.0.2.45"), octocat(), CacheMode::Use)
        .await;
    assert!(other.success);
    assert!(other.is_from_cache());
    assert_eq!(adapter.calls(), 1);
}
