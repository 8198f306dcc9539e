//! Platform source adapters.
//!
//! | Adapter | Strategy | Upstream |
//! |---------|----------|----------|
//! | [`LeetCodeAdapter`] | API | GraphQL `POST /graphql` |
//! | [`CodeforcesAdapter`] | API | `user.info` + `user.status` |
//! | [`GitHubAdapter`] | API | `GET /users/{name}` |
//! | [`CodeChefAdapter`] | Browser | `/users/{name}` profile page |
//! | [`AtCoderAdapter`] | Browser | `/users/{name}` profile page |

mod atcoder;
mod codechef;
mod codeforces;
mod github;
mod leetcode;

pub use atcoder::AtCoderAdapter;
pub use codechef::CodeChefAdapter;
pub use codeforces::CodeforcesAdapter;
pub use github::GitHubAdapter;
pub use leetcode::LeetCodeAdapter;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::domain::RawSourceRecord;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::render::{extract_fields, inspect_page, FieldSpec, RenderPool};
use crate::source::{SourceAdapter, SourceError};

/// Builds one adapter per supported platform.
///
/// API adapters share `http_client`; browser adapters share `render_pool`.
pub fn default_adapters(
    http_client: Arc<dyn HttpClient>,
    render_pool: RenderPool,
    github_token: Option<String>,
) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(LeetCodeAdapter::with_http_client(Arc::clone(&http_client))),
        Arc::new(CodeforcesAdapter::with_http_client(Arc::clone(&http_client))),
        Arc::new(GitHubAdapter::with_http_client(http_client).with_token(github_token)),
        Arc::new(CodeChefAdapter::new(render_pool.clone())),
        Arc::new(AtCoderAdapter::new(render_pool)),
    ]
}

/// Sends `request`, mapping transport failures into the source taxonomy.
async fn send(
    http_client: &dyn HttpClient,
    request: HttpRequest,
    context: &str,
) -> Result<HttpResponse, SourceError> {
    http_client
        .execute(request)
        .await
        .map_err(|error| error.into_source_error(context))
}

fn parse_json<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, SourceError> {
    serde_json::from_str(body)
        .map_err(|error| SourceError::parse_failure(format!("{context}: malformed payload: {error}")))
}

fn status_error(response: &HttpResponse, context: &str) -> SourceError {
    SourceError::from_status(
        response.status,
        format!("{context}: upstream returned status {}", response.status),
    )
}

/// Render, inspect and extract: the shared browser-strategy flow.
async fn scrape_profile(
    render_pool: &RenderPool,
    url: &str,
    fields: &[FieldSpec],
) -> Result<RawSourceRecord, SourceError> {
    let page = render_pool.render(url).await?;
    inspect_page(&page)?;
    Ok(extract_fields(&page.html, fields))
}
