use super::scrape_profile;
use crate::platform::Platform;
use crate::render::{Extractor, FieldSpec, RenderPool};
use crate::source::{AdapterFuture, AdapterStrategy, SourceAdapter};

const RATING: &[Extractor] = &[
    Extractor::TableRow { label: "Rating" },
    Extractor::Label { label: "Rating" },
];

const HIGHEST_RATING: &[Extractor] = &[
    Extractor::TableRow {
        label: "Highest Rating",
    },
    Extractor::Label {
        label: "Highest Rating",
    },
];

const RANK: &[Extractor] = &[
    Extractor::TableRow { label: "Rank" },
    Extractor::Label { label: "Rank" },
];

const RATED_MATCHES: &[Extractor] = &[
    Extractor::TableRow {
        label: "Rated Matches",
    },
    Extractor::Label {
        label: "Rated Matches",
    },
];

const FIELDS: &[FieldSpec] = &[
    FieldSpec::number("rating", RATING),
    FieldSpec::number("maxRating", HIGHEST_RATING),
    FieldSpec::optional_number("rank", RANK),
    FieldSpec::number("ratedMatches", RATED_MATCHES),
];

/// AtCoder profile-page adapter.
#[derive(Debug, Clone)]
pub struct AtCoderAdapter {
    render_pool: RenderPool,
}

impl AtCoderAdapter {
    pub fn new(render_pool: RenderPool) -> Self {
        Self { render_pool }
    }
}

impl SourceAdapter for AtCoderAdapter {
    fn platform(&self) -> Platform {
        Platform::AtCoder
    }

    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::Browser
    }

    fn fetch<'a>(&'a self, username: &'a str) -> AdapterFuture<'a> {
        Box::pin(async move {
            let url = Platform::AtCoder.profile_url(username);
            scrape_profile(&self.render_pool, &url, FIELDS).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapters::testing::{render_pool, RecordingHttpClient};
    use crate::http_client::HttpResponse;
    use crate::source::SourceErrorKind;

    const PROFILE_PAGE: &str = r#"
        <html><head><title>tourist - AtCoder</title></head>
        <body>
          <ul class="nav"><li><a href="/ranking">Ranking</a></li></ul>
          <table class="dl-table mt-2">
            <tr><th class="no-break">Rank</th><td>1st</td></tr>
            <tr><th class="no-break">Rating</th><td><span class="user-red">3858</span></td></tr>
            <tr><th class="no-break">Highest Rating</th><td><span class="user-red">4229</span>
              <span class="gray">―</span> <span class="bold">King</span></td></tr>
            <tr><th class="no-break">Rated Matches <span class="glyphicon"></span></th><td>62</td></tr>
            <tr><th class="no-break">Last Competed</th><td>2024/05/26</td></tr>
          </table>
        </body></html>
    "#;

    #[tokio::test]
    async fn fetch_extracts_table_rows() {
        let client = Arc::new(RecordingHttpClient::new(Ok(HttpResponse::ok(PROFILE_PAGE))));
        let adapter = AtCoderAdapter::new(render_pool(Arc::clone(&client)));

        let record = adapter.fetch("tourist").await.expect("fetches");

        assert_eq!(record.u64_field("rank"), Some(1));
        assert_eq!(record.u64_field("rating"), Some(3858));
        assert_eq!(record.u64_field("maxRating"), Some(4229));
        assert_eq!(record.u64_field("ratedMatches"), Some(62));
        assert_eq!(
            client.recorded_requests()[0].url,
            "https://atcoder.jp/users/tourist"
        );
    }

    #[tokio::test]
    async fn missing_profile_maps_to_not_found() {
        let client = Arc::new(RecordingHttpClient::new(Ok(HttpResponse::new(
            404,
            "<html><head><title>404 Not Found - AtCoder</title></head></html>",
        ))));
        let adapter = AtCoderAdapter::new(render_pool(client));

        let error = adapter.fetch("ghost").await.expect_err("missing");

        assert_eq!(error.kind(), SourceErrorKind::NotFound);
    }
}
