use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{parse_json, send, status_error};
use crate::domain::RawSourceRecord;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::platform::Platform;
use crate::source::{AdapterFuture, AdapterStrategy, SourceAdapter, SourceError};

const API_BASE: &str = "https://codeforces.com/api";
const STATUS_PAGE_SIZE: u32 = 10_000;

/// Codeforces REST adapter.
///
/// Issues `user.info` for the rating block and `user.status` to count
/// distinct accepted problems.
#[derive(Clone)]
pub struct CodeforcesAdapter {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
}

impl Default for CodeforcesAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::default()))
    }
}

impl CodeforcesAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            api_base: String::from(API_BASE),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        url: String,
        username: &str,
    ) -> Result<T, SourceError> {
        let response = send(self.http_client.as_ref(), HttpRequest::get(&url), "codeforces").await?;
        let envelope = envelope_from(&response, username)?;
        envelope.result.ok_or_else(|| {
            SourceError::parse_failure("codeforces: OK response without a result payload")
        })
    }

    async fn fetch_profile(&self, username: &str) -> Result<RawSourceRecord, SourceError> {
        let handle = urlencoding::encode(username);
        let users: Vec<CodeforcesUser> = self
            .call(format!("{}/user.info?handles={handle}", self.api_base), username)
            .await?;
        let user = users.into_iter().next().ok_or_else(|| {
            SourceError::not_found(format!("codeforces: user '{username}' not found"))
        })?;

        let submissions: Vec<CodeforcesSubmission> = self
            .call(
                format!(
                    "{}/user.status?handle={handle}&from=1&count={STATUS_PAGE_SIZE}",
                    self.api_base
                ),
                username,
            )
            .await?;

        let mut record = RawSourceRecord::success()
            .with_field("handle", user.handle)
            .with_field("contribution", user.contribution)
            .with_field("problemsSolved", distinct_accepted(&submissions) as u64);
        if let Some(rating) = user.rating {
            record.insert("rating", rating);
        }
        if let Some(max_rating) = user.max_rating {
            record.insert("maxRating", max_rating);
        }
        if let Some(rank) = user.rank {
            record.insert("rank", rank);
        }
        if let Some(max_rank) = user.max_rank {
            record.insert("maxRank", max_rank);
        }
        Ok(record)
    }
}

impl SourceAdapter for CodeforcesAdapter {
    fn platform(&self) -> Platform {
        Platform::Codeforces
    }

    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::Api
    }

    fn fetch<'a>(&'a self, username: &'a str) -> AdapterFuture<'a> {
        Box::pin(async move { self.fetch_profile(username).await })
    }
}

/// Unwraps the `{status, comment, result}` envelope.
///
/// Codeforces answers unknown handles with HTTP 400 and a `FAILED` status, so
/// the comment is consulted before the status code.
fn envelope_from<T: DeserializeOwned>(
    response: &HttpResponse,
    username: &str,
) -> Result<CodeforcesEnvelope<T>, SourceError> {
    let parsed = parse_json::<CodeforcesEnvelope<T>>(&response.body, "codeforces");

    match parsed {
        Ok(envelope) if envelope.status == "OK" && response.is_success() => Ok(envelope),
        Ok(envelope) => {
            let comment = envelope.comment.unwrap_or_default();
            if comment.to_ascii_lowercase().contains("not found") {
                Err(SourceError::not_found(format!(
                    "codeforces: user '{username}' not found"
                ))
                .with_status(response.status))
            } else if response.is_success() {
                Err(SourceError::parse_failure(format!(
                    "codeforces: request failed: {comment}"
                )))
            } else {
                Err(status_error(response, "codeforces"))
            }
        }
        Err(_) if !response.is_success() => Err(status_error(response, "codeforces")),
        Err(error) => Err(error),
    }
}

fn distinct_accepted(submissions: &[CodeforcesSubmission]) -> usize {
    submissions
        .iter()
        .filter(|submission| submission.verdict.as_deref() == Some("OK"))
        .map(|submission| {
            let problem = &submission.problem;
            match problem.contest_id {
                Some(contest_id) => format!("{contest_id}/{}", problem.index),
                None => problem.name.clone(),
            }
        })
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Debug, Deserialize)]
struct CodeforcesEnvelope<T> {
    status: String,
    #[serde(default)]
    comment: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeforcesUser {
    handle: String,
    #[serde(default)]
    rating: Option<u64>,
    #[serde(default)]
    max_rating: Option<u64>,
    #[serde(default)]
    rank: Option<String>,
    #[serde(default)]
    max_rank: Option<String>,
    #[serde(default)]
    contribution: i64,
}

#[derive(Debug, Deserialize)]
struct CodeforcesSubmission {
    problem: CodeforcesProblem,
    #[serde(default)]
    verdict: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeforcesProblem {
    #[serde(default)]
    contest_id: Option<u64>,
    #[serde(default)]
    index: String,
    #[serde(default)]
    name: String,
}
