use std::sync::Mutex;

use cpstats_tests::{
    default_adapters, normalize, AdapterStrategy, Arc, HttpClient, HttpError, HttpFuture,
    HttpRenderBackend, HttpRequest, HttpResponse, Platform, RenderPool, RenderPoolConfig,
    SourceAdapter, SourceErrorKind, SurfaceOptions,
};

/// Answers by the first route whose pattern occurs in the request url.
struct RoutedHttpClient {
    routes: Vec<(&'static str, HttpResponse)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RoutedHttpClient {
    fn new(routes: Vec<(&'static str, HttpResponse)>) -> Arc<Self> {
        Arc::new(Self {
            routes,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }
}

impl HttpClient for RoutedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let response = self
            .routes
            .iter()
            .find(|(pattern, _)| request.url.contains(pattern))
            .map(|(_, response)| response.clone())
            .ok_or_else(|| HttpError::connect(format!("no route for {}", request.url)));
        self.requests.lock().expect("lock").push(request);
        Box::pin(async move { response })
    }
}

fn adapters_over(client: Arc<RoutedHttpClient>) -> Vec<Arc<dyn SourceAdapter>> {
    let pool = RenderPool::new(
        Arc::new(HttpRenderBackend::new(Arc::clone(&client) as Arc<dyn HttpClient>)),
        RenderPoolConfig::default(),
        SurfaceOptions::default(),
    );
    default_adapters(client, pool, None)
}

fn healthy_upstreams() -> Arc<RoutedHttpClient> {
    RoutedHttpClient::new(vec![
        (
            "leetcode.com/graphql",
            HttpResponse::ok(
                r#"{"data":{"matchedUser":{"profile":{"ranking":99,"reputation":3},
                "submitStatsGlobal":{"acSubmissionNum":[{"difficulty":"All","count":321}]}},
                "userContestRanking":{"rating":1888.4}}}"#,
            ),
        ),
        (
            "user.info",
            HttpResponse::ok(
                r#"{"status":"OK","result":[{"handle":"tourist","rating":3979,"maxRating":4009,"rank":"legendary grandmaster"}]}"#,
            ),
        ),
        (
            "user.status",
            HttpResponse::ok(
                r#"{"status":"OK","result":[{"problem":{"contestId":1,"index":"A"},"verdict":"OK"}]}"#,
            ),
        ),
        (
            "api.github.com/users",
            HttpResponse::ok(r#"{"login":"octocat","public_repos":8,"followers":100,"following":1}"#),
        ),
        (
            "codechef.com/users",
            HttpResponse::ok(
                r#"<html><head><title>gennady | CodeChef</title></head><body>
                <div class="rating-number">2150</div>
                <p>Total Problems Solved: 812</p></body></html>"#,
            ),
        ),
        (
            "atcoder.jp/users",
            HttpResponse::ok(
                r#"<html><head><title>tourist - AtCoder</title></head><body><table>
                <tr><th>Rank</th><td>1st</td></tr>
                <tr><th>Rating</th><td>3858</td></tr></table></body></html>"#,
            ),
        ),
    ])
}

#[test]
fn every_platform_has_exactly_one_adapter_with_its_strategy() {
    let adapters = adapters_over(healthy_upstreams());

    let mut platforms: Vec<Platform> = adapters.iter().map(|adapter| adapter.platform()).collect();
    platforms.sort();
    let mut expected = Platform::ALL.to_vec();
    expected.sort();
    assert_eq!(platforms, expected, "one adapter per platform");

    for adapter in &adapters {
        let expected_strategy = match adapter.platform() {
            Platform::CodeChef | Platform::AtCoder => AdapterStrategy::Browser,
            _ => AdapterStrategy::Api,
        };
        assert_eq!(
            adapter.strategy(),
            expected_strategy,
            "adapter '{}': strategy",
            adapter.platform()
        );
    }
}

#[tokio::test]
async fn every_adapter_output_normalizes_with_base_fields() {
    let client = healthy_upstreams();
    let adapters = adapters_over(Arc::clone(&client));

    for adapter in &adapters {
        let platform = adapter.platform();
        let username = match platform {
            Platform::GitHub => "octocat",
            Platform::CodeChef => "gennady",
            _ => "tourist",
        };

        let raw = adapter
            .fetch(username)
            .await
            .unwrap_or_else(|error| panic!("adapter '{platform}' fetch failed: {error}"));
        assert!(raw.is_success(), "adapter '{platform}': success record");

        let profile = normalize(platform, username, &raw)
            .unwrap_or_else(|error| panic!("adapter '{platform}' normalize failed: {error}"));
        let value = serde_json::to_value(&profile).expect("serializes");
        for key in ["platform", "username", "rating", "totalSolved", "rank"] {
            assert!(
                value.get(key).is_some(),
                "adapter '{platform}': base field '{key}' missing"
            );
        }
        assert_eq!(value["platform"], platform.as_str());
    }

    let urls = client.urls();
    assert!(urls.iter().any(|url| url.contains("codeforces.com/api/user.status")));
    assert!(urls.iter().any(|url| url == "https://www.codechef.com/users/gennady"));
}

#[tokio::test]
async fn every_adapter_maps_missing_profiles_to_not_found() {
    let client = RoutedHttpClient::new(vec![
        (
            "leetcode.com/graphql",
            HttpResponse::ok(r#"{"data":{"matchedUser":null}}"#),
        ),
        (
            "codeforces.com/api",
            HttpResponse::new(
                400,
                r#"{"status":"FAILED","comment":"handles: User with handle ghost not found"}"#,
            ),
        ),
        ("api.github.com", HttpResponse::new(404, r#"{"message":"Not Found"}"#)),
        (
            "codechef.com",
            HttpResponse::ok("<html><title>CodeChef</title><body>Broken Link</body></html>"),
        ),
        ("atcoder.jp", HttpResponse::new(404, "<html><title>404 Not Found</title></html>")),
    ]);

    for adapter in adapters_over(client) {
        let error = adapter
            .fetch("ghost")
            .await
            .expect_err("missing profile must fail");
        assert_eq!(
            error.kind(),
            SourceErrorKind::NotFound,
            "adapter '{}': {error}",
            adapter.platform()
        );
        assert!(!error.retryable(), "adapter '{}': terminal", adapter.platform());
    }
}

#[tokio::test]
async fn every_adapter_classifies_transport_failures_as_retryable() {
    let client = RoutedHttpClient::new(Vec::new());

    for adapter in adapters_over(client) {
        let error = adapter.fetch("tourist").await.expect_err("no upstream");
        assert_eq!(
            error.kind(),
            SourceErrorKind::Network,
            "adapter '{}': {error}",
            adapter.platform()
        );
        assert!(error.retryable(), "adapter '{}': retryable", adapter.platform());
    }
}
