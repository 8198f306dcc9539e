use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use super::{parse_json, send, status_error};
use crate::domain::RawSourceRecord;
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::platform::Platform;
use crate::source::{AdapterFuture, AdapterStrategy, SourceAdapter, SourceError};

const GRAPHQL_ENDPOINT: &str = "https://leetcode.com/graphql";

const PROFILE_QUERY: &str = "query userProfile($username: String!) {
  matchedUser(username: $username) {
    username
    profile { ranking reputation }
    submitStatsGlobal { acSubmissionNum { difficulty count } }
  }
  userContestRanking(username: $username) { rating globalRanking }
}";

/// LeetCode GraphQL adapter.
#[derive(Clone)]
pub struct LeetCodeAdapter {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
}

impl Default for LeetCodeAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::default()))
    }
}

impl LeetCodeAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            endpoint: String::from(GRAPHQL_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch_profile(&self, username: &str) -> Result<RawSourceRecord, SourceError> {
        let body = json!({
            "operationName": "userProfile",
            "query": PROFILE_QUERY,
            "variables": { "username": username },
        });
        let request = HttpRequest::post_json(&self.endpoint, body.to_string())
            .with_header("referer", format!("https://leetcode.com/u/{username}/"))
            .with_header("origin", "https://leetcode.com");

        let response = send(self.http_client.as_ref(), request, "leetcode").await?;
        if !response.is_success() {
            return Err(status_error(&response, "leetcode"));
        }

        let payload: GraphQlResponse = parse_json(&response.body, "leetcode")?;
        let data = payload.data.unwrap_or_default();

        let Some(user) = data.matched_user else {
            let detail = payload
                .errors
                .first()
                .map(|error| error.message.as_str())
                .unwrap_or("matchedUser is null");
            return Err(SourceError::not_found(format!(
                "leetcode: user '{username}' not found ({detail})"
            )));
        };

        Ok(profile_record(user, data.user_contest_ranking))
    }
}

impl SourceAdapter for LeetCodeAdapter {
    fn platform(&self) -> Platform {
        Platform::LeetCode
    }

    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::Api
    }

    fn fetch<'a>(&'a self, username: &'a str) -> AdapterFuture<'a> {
        Box::pin(async move { self.fetch_profile(username).await })
    }
}

fn profile_record(user: MatchedUser, contest: Option<ContestRanking>) -> RawSourceRecord {
    let solved = |difficulty: &str| {
        user.submit_stats_global
            .ac_submission_num
            .iter()
            .find(|entry| entry.difficulty.eq_ignore_ascii_case(difficulty))
            .map_or(0, |entry| entry.count)
    };

    let mut record = RawSourceRecord::success()
        .with_field("totalSolved", solved("All"))
        .with_field("easySolved", solved("Easy"))
        .with_field("mediumSolved", solved("Medium"))
        .with_field("hardSolved", solved("Hard"))
        .with_field("reputation", user.profile.reputation);

    if let Some(ranking) = user.profile.ranking {
        record.insert("rank", ranking);
    }
    if let Some(contest) = contest {
        // LeetCode reports fractional contest ratings.
        let rating = contest.rating.max(0.0).round() as u64;
        record.insert("rating", rating);
        record.insert("contestRating", rating);
        if let Some(global) = contest.global_ranking {
            record.insert("contestGlobalRanking", global);
        }
    }
    record
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<ProfileData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileData {
    #[serde(default)]
    matched_user: Option<MatchedUser>,
    #[serde(default)]
    user_contest_ranking: Option<ContestRanking>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchedUser {
    #[serde(default)]
    profile: UserProfile,
    #[serde(default)]
    submit_stats_global: SubmitStats,
}

#[derive(Debug, Default, Deserialize)]
struct UserProfile {
    #[serde(default)]
    ranking: Option<u64>,
    #[serde(default)]
    reputation: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitStats {
    #[serde(default)]
    ac_submission_num: Vec<SubmissionCount>,
}

#[derive(Debug, Deserialize)]
struct SubmissionCount {
    difficulty: String,
    count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContestRanking {
    rating: f64,
    #[serde(default)]
    global_ranking: Option<u64>,
}
