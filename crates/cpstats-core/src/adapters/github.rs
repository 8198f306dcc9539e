use std::sync::Arc;

use serde::Deserialize;

use super::{parse_json, send, status_error};
use crate::domain::RawSourceRecord;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, ReqwestHttpClient};
use crate::platform::Platform;
use crate::source::{AdapterFuture, AdapterStrategy, SourceAdapter, SourceError};

const API_BASE: &str = "https://api.github.com";

/// GitHub REST adapter for public user statistics.
///
/// Anonymous calls are limited to 60 per hour; a token raises the ceiling.
#[derive(Clone)]
pub struct GitHubAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    api_base: String,
}

impl Default for GitHubAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::default()))
    }
}

impl GitHubAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            auth: HttpAuth::None,
            api_base: String::from(API_BASE),
        }
    }

    /// Sends `token` as a bearer credential; blank or missing tokens keep
    /// anonymous access.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.auth = match token {
            Some(token) if !token.trim().is_empty() => HttpAuth::BearerToken(token.trim().to_owned()),
            _ => HttpAuth::None,
        };
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn fetch_profile(&self, username: &str) -> Result<RawSourceRecord, SourceError> {
        let url = format!("{}/users/{}", self.api_base, urlencoding::encode(username));
        let request = HttpRequest::get(url)
            .with_header("accept", "application/vnd.github+json")
            .with_header("x-github-api-version", "2022-11-28")
            .with_auth(&self.auth);

        let response = send(self.http_client.as_ref(), request, "github").await?;
        match response.status {
            200..=299 => {}
            404 => {
                return Err(SourceError::not_found(format!(
                    "github: user '{username}' not found"
                ))
                .with_status(404));
            }
            403 | 429 if response.body.to_ascii_lowercase().contains("rate limit") => {
                return Err(SourceError::rate_limited(
                    "github: API rate limit exceeded; configure a token to raise it",
                )
                .with_status(response.status));
            }
            _ => return Err(status_error(&response, "github")),
        }

        let user: GitHubUser = parse_json(&response.body, "github")?;
        let mut record = RawSourceRecord::success()
            .with_field("login", user.login)
            .with_field("publicRepos", user.public_repos)
            .with_field("publicGists", user.public_gists)
            .with_field("followers", user.followers)
            .with_field("following", user.following);
        if let Some(name) = user.name {
            record.insert("name", name);
        }
        Ok(record)
    }
}

impl SourceAdapter for GitHubAdapter {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::Api
    }

    fn fetch<'a>(&'a self, username: &'a str) -> AdapterFuture<'a> {
        Box::pin(async move { self.fetch_profile(username).await })
    }
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    public_repos: u64,
    #[serde(default)]
    public_gists: u64,
    #[serde(default)]
    followers: u64,
    #[serde(default)]
    following: u64,
}
