//! Remote data gateway for the repository-hosting API.
//!
//! All outbound reads go through [`RepoGateway`]. The HTTP implementation,
//! [`GithubGateway`], classifies every response into a [`FetchOutcome`] and
//! applies one retry policy:
//!
//! - Transient failures (transport errors, 5xx, unexpected statuses) are
//!   retried up to [`RetryPolicy::max_attempts`] times with a fixed delay
//! - `409`, `404` and `403` are final and never retried
//! - A `403`/`429` that signals rate limiting aborts retries immediately
//!
//! # Example
//!
//! ```no_run
//! use repowatch_monitor::gateway::{FetchOutcome, GithubGateway, RepoGateway};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = GithubGateway::new("https://api.github.com", None).unwrap();
//!
//!     if let FetchOutcome::Ok(repos) = gateway.list_repositories("octocat").await {
//!         println!("{} repositories", repos.len());
//!     }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::types::{CommitDescriptor, RateLimitStatus, RepositoryDescriptor};

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of attempts for idempotent reads.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts.
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Page size used when listing repositories.
const REPOS_PER_PAGE: usize = 100;

/// Upper bound on repository listing pages per account.
const MAX_REPO_PAGES: u32 = 10;

/// Header carrying the remaining core quota.
const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Errors raised while constructing the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The access token contains characters not allowed in a header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Classified result of one gateway read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    /// `200` with a parsed body.
    Ok(T),

    /// `409`: the repository has no commits.
    Empty,

    /// `403` without a rate-limit signal.
    Forbidden,

    /// `404`: deleted, renamed, or never existed.
    NotFound,

    /// The quota is exhausted (`429`, or `403` flagged as rate limiting).
    RateLimited,

    /// Network failure or any other unexpected response.
    TransportError(String),
}

impl<T> FetchOutcome<T> {
    /// Transforms the success payload, keeping the classification otherwise.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> FetchOutcome<U> {
        match self {
            Self::Ok(value) => FetchOutcome::Ok(f(value)),
            Self::Empty => FetchOutcome::Empty,
            Self::Forbidden => FetchOutcome::Forbidden,
            Self::NotFound => FetchOutcome::NotFound,
            Self::RateLimited => FetchOutcome::RateLimited,
            Self::TransportError(message) => FetchOutcome::TransportError(message),
        }
    }

    /// Returns the success payload, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            _ => None,
        }
    }

    /// True for the classifications that permanently deny commit access.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::Empty | Self::Forbidden | Self::NotFound)
    }

    /// True when another attempt may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }

    /// Short label for log lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::Empty => "empty",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::TransportError(_) => "transport_error",
        }
    }
}

/// Classifies a non-body-bearing view of an HTTP response.
///
/// `remaining` is the parsed `x-ratelimit-remaining` header, when present.
/// A `200` classifies as `Ok(())`; the caller parses the body afterwards.
#[must_use]
pub fn classify_response(status: StatusCode, remaining: Option<u32>, body: &str) -> FetchOutcome<()> {
    match status {
        StatusCode::OK => FetchOutcome::Ok(()),
        StatusCode::CONFLICT => FetchOutcome::Empty,
        StatusCode::NOT_FOUND => FetchOutcome::NotFound,
        StatusCode::TOO_MANY_REQUESTS => FetchOutcome::RateLimited,
        StatusCode::FORBIDDEN => {
            if remaining == Some(0) || body.to_ascii_lowercase().contains("rate limit") {
                FetchOutcome::RateLimited
            } else {
                FetchOutcome::Forbidden
            }
        }
        _ => FetchOutcome::TransportError(format!("unexpected status {status}")),
    }
}

/// Fixed-delay retry policy for idempotent reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// Same attempt count with a negligible delay.
    #[must_use]
    pub fn fast_for_tests() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(10),
        }
    }
}

/// Read access to the repository-hosting platform.
#[async_trait]
pub trait RepoGateway: Send + Sync {
    /// Lists every repository owned by `account`.
    async fn list_repositories(&self, account: &str) -> FetchOutcome<Vec<RepositoryDescriptor>>;

    /// Lists commits newest first, optionally after `since` and capped at `limit`.
    async fn list_commits(
        &self,
        account: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> FetchOutcome<Vec<CommitDescriptor>>;

    /// Reports the core API quota.
    async fn rate_limit_status(&self) -> FetchOutcome<RateLimitStatus>;

    /// Resolves the login that owns the configured credentials.
    async fn validate_credentials(&self) -> FetchOutcome<String>;
}

#[derive(Debug, Deserialize)]
struct CommitEnvelope {
    sha: String,
    html_url: String,
    commit: CommitBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    #[serde(default)]
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl CommitEnvelope {
    /// Flattens the payload; commits without an author date are unusable.
    fn into_descriptor(self) -> Option<CommitDescriptor> {
        let author = self.commit.author?;
        Some(CommitDescriptor {
            sha: self.sha,
            message: self.commit.message,
            author_name: author.name.unwrap_or_else(|| "unknown".to_string()),
            author_date: author.date?,
            html_url: self.html_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitCore,
}

#[derive(Debug, Deserialize)]
struct RateLimitCore {
    limit: u32,
    remaining: u32,
    reset: i64,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

/// HTTP gateway for the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubGateway {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GithubGateway {
    /// Creates a gateway for `base_url`, authenticating with `token` when given.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the token is not a valid header value or
    /// the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: Option<&str>) -> Result<Self, GatewayError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("repowatch-monitor/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues a GET with the retry policy applied.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> FetchOutcome<T> {
        let mut attempt = 1;
        loop {
            let outcome = self.get_once(path, query).await;
            if !outcome.is_transient() || attempt >= self.retry.max_attempts {
                return outcome;
            }

            if let FetchOutcome::TransportError(message) = &outcome {
                warn!(
                    path = %path,
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = self.retry.delay.as_millis(),
                    error = %message,
                    "Request failed, retrying"
                );
            }
            sleep(self.retry.delay).await;
            attempt += 1;
        }
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> FetchOutcome<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");

        let response = match self.client.get(&url).query(query).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::TransportError(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::OK {
            return match response.json::<T>().await {
                Ok(body) => FetchOutcome::Ok(body),
                Err(e) => FetchOutcome::TransportError(format!("invalid response body: {e}")),
            };
        }

        let remaining = response
            .headers()
            .get(RATE_LIMIT_REMAINING_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok());
        let body = response.text().await.unwrap_or_default();

        into_failure(classify_response(status, remaining, &body))
    }
}

/// Re-types a non-`200` classification.
fn into_failure<T>(outcome: FetchOutcome<()>) -> FetchOutcome<T> {
    match outcome {
        FetchOutcome::Ok(()) => FetchOutcome::TransportError("unexpected success status".to_string()),
        FetchOutcome::Empty => FetchOutcome::Empty,
        FetchOutcome::Forbidden => FetchOutcome::Forbidden,
        FetchOutcome::NotFound => FetchOutcome::NotFound,
        FetchOutcome::RateLimited => FetchOutcome::RateLimited,
        FetchOutcome::TransportError(message) => FetchOutcome::TransportError(message),
    }
}

#[async_trait]
impl RepoGateway for GithubGateway {
    async fn list_repositories(&self, account: &str) -> FetchOutcome<Vec<RepositoryDescriptor>> {
        let path = format!("/users/{account}/repos");
        let mut repositories = Vec::new();

        for page in 1..=MAX_REPO_PAGES {
            let query = [
                ("per_page", REPOS_PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let batch: Vec<RepositoryDescriptor> = match self.get_json(&path, &query).await {
                FetchOutcome::Ok(batch) => batch,
                other => {
                    warn!(
                        account = %account,
                        page,
                        outcome = other.label(),
                        "Failed to list repositories"
                    );
                    return other;
                }
            };

            let short_page = batch.len() < REPOS_PER_PAGE;
            repositories.extend(batch);
            if short_page {
                break;
            }
        }

        debug!(account = %account, count = repositories.len(), "Listed repositories");
        FetchOutcome::Ok(repositories)
    }

    async fn list_commits(
        &self,
        account: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> FetchOutcome<Vec<CommitDescriptor>> {
        let path = format!("/repos/{account}/{repo}/commits");
        let mut query = Vec::new();
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(limit) = limit {
            query.push(("per_page", limit.to_string()));
        }

        let outcome: FetchOutcome<Vec<CommitEnvelope>> = self.get_json(&path, &query).await;
        match &outcome {
            FetchOutcome::Ok(_) => {}
            denied if denied.is_access_denied() => {
                debug!(
                    account = %account,
                    repo = %repo,
                    outcome = denied.label(),
                    "No accessible commits"
                );
            }
            other => {
                warn!(
                    account = %account,
                    repo = %repo,
                    outcome = other.label(),
                    "Failed to list commits"
                );
            }
        }

        outcome.map(|envelopes| {
            let mut commits: Vec<CommitDescriptor> = envelopes
                .into_iter()
                .filter_map(CommitEnvelope::into_descriptor)
                .collect();
            if let Some(limit) = limit {
                commits.truncate(limit as usize);
            }
            commits
        })
    }

    async fn rate_limit_status(&self) -> FetchOutcome<RateLimitStatus> {
        let outcome: FetchOutcome<RateLimitResponse> = self.get_json("/rate_limit", &[]).await;
        outcome.map(|response| {
            let core = response.resources.core;
            RateLimitStatus {
                remaining: core.remaining,
                limit: core.limit,
                reset_at: DateTime::from_timestamp(core.reset, 0).unwrap_or_else(Utc::now),
            }
        })
    }

    async fn validate_credentials(&self) -> FetchOutcome<String> {
        let outcome: FetchOutcome<UserResponse> = self.get_json("/user", &[]).await;
        outcome.map(|user| user.login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_gateway(mock_server: &MockServer) -> GithubGateway {
        GithubGateway::new(mock_server.uri(), Some("test-token"))
            .expect("failed to create test gateway")
            .with_retry_policy(RetryPolicy::fast_for_tests())
    }

    fn repo_json(name: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "created_at": "2024-05-01T00:00:00Z",
            "updated_at": "2024-05-02T00:00:00Z",
            "description": null,
            "html_url": format!("https://github.com/alice/{name}"),
            "topics": [],
            "language": "Rust",
            "stargazers_count": 1
        })
    }

    fn commit_json(sha: &str, date: &str) -> serde_json::Value {
        serde_json::json!({
            "sha": sha,
            "html_url": format!("https://github.com/alice/widget/commit/{sha}"),
            "commit": {
                "message": format!("commit {sha}"),
                "author": { "name": "Alice", "email": "alice@example.com", "date": date }
            }
        })
    }

    // ==================== classify_response tests ====================

    #[test]
    fn test_classify_maps_statuses() {
        assert_eq!(classify_response(StatusCode::OK, None, ""), FetchOutcome::Ok(()));
        assert_eq!(classify_response(StatusCode::CONFLICT, None, ""), FetchOutcome::Empty);
        assert_eq!(classify_response(StatusCode::NOT_FOUND, None, ""), FetchOutcome::NotFound);
        assert_eq!(
            classify_response(StatusCode::TOO_MANY_REQUESTS, None, ""),
            FetchOutcome::RateLimited
        );
        assert!(classify_response(StatusCode::BAD_GATEWAY, None, "").is_transient());
    }

    #[test]
    fn test_classify_distinguishes_rate_limited_forbidden() {
        assert_eq!(
            classify_response(StatusCode::FORBIDDEN, Some(12), "Resource not accessible"),
            FetchOutcome::Forbidden
        );
        assert_eq!(
            classify_response(StatusCode::FORBIDDEN, None, "API rate limit exceeded for 1.2.3.4"),
            FetchOutcome::RateLimited
        );
        assert_eq!(
            classify_response(StatusCode::FORBIDDEN, Some(0), ""),
            FetchOutcome::RateLimited
        );
    }

    #[test]
    fn test_access_denied_covers_empty_forbidden_not_found() {
        assert!(FetchOutcome::<()>::Empty.is_access_denied());
        assert!(FetchOutcome::<()>::Forbidden.is_access_denied());
        assert!(FetchOutcome::<()>::NotFound.is_access_denied());
        assert!(!FetchOutcome::<()>::RateLimited.is_access_denied());
        assert!(!FetchOutcome::<()>::TransportError("x".into()).is_access_denied());
    }

    #[test]
    fn test_new_trims_trailing_slash_from_url() {
        let gateway = GithubGateway::new("https://api.github.com/", None).unwrap();
        assert_eq!(gateway.base_url(), "https://api.github.com");
    }

    #[test]
    fn test_new_rejects_token_with_newline() {
        let result = GithubGateway::new("https://api.github.com", Some("bad\ntoken"));
        assert!(matches!(result, Err(GatewayError::InvalidHeader(_))));
    }

    // ==================== list_repositories tests ====================

    #[tokio::test]
    async fn test_list_repositories_sends_token_and_parses() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/alice/repos"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([repo_json("a"), repo_json("b")])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        let repos = gateway.list_repositories("alice").await.ok().unwrap();

        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "a");
        assert_eq!(repos[1].language.as_deref(), Some("Rust"));
    }

    #[tokio::test]
    async fn test_list_repositories_follows_pages() {
        let mock_server = MockServer::start().await;

        let first_page: Vec<_> = (0..REPOS_PER_PAGE).map(|i| repo_json(&format!("r{i}"))).collect();
        Mock::given(method("GET"))
            .and(path("/users/alice/repos"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/users/alice/repos"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([repo_json("last")])),
            )
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        let repos = gateway.list_repositories("alice").await.ok().unwrap();

        assert_eq!(repos.len(), REPOS_PER_PAGE + 1);
        assert_eq!(repos.last().unwrap().name, "last");
    }

    #[tokio::test]
    async fn test_list_repositories_not_found_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/ghost/repos"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        assert_eq!(
            gateway.list_repositories("ghost").await,
            FetchOutcome::NotFound
        );
    }

    // ==================== retry tests ====================

    #[tokio::test]
    async fn test_server_error_is_retried_until_exhausted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/alice/repos"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        let outcome = gateway.list_repositories("alice").await;

        assert!(outcome.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_then_success_recovers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/alice/repos"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/users/alice/repos"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([repo_json("a")])),
            )
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        let repos = gateway.list_repositories("alice").await.ok().unwrap();
        assert_eq!(repos.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_forbidden_aborts_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/alice/widget/commits"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .set_body_string(r#"{"message":"API rate limit exceeded"}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        let outcome = gateway.list_commits("alice", "widget", None, Some(5)).await;

        assert_eq!(outcome, FetchOutcome::RateLimited);
    }

    // ==================== list_commits tests ====================

    #[tokio::test]
    async fn test_list_commits_passes_since_and_limit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/alice/widget/commits"))
            .and(query_param("since", "2024-05-01T00:00:00Z"))
            .and(query_param("per_page", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                commit_json("bbb", "2024-05-03T00:00:00Z"),
                commit_json("aaa", "2024-05-02T00:00:00Z"),
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let since = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let gateway = create_test_gateway(&mock_server);
        let commits = gateway
            .list_commits("alice", "widget", Some(since), Some(5))
            .await
            .ok()
            .unwrap();

        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "bbb");
        assert_eq!(commits[0].author_name, "Alice");
        assert_eq!(commits[0].message, "commit bbb");
    }

    #[tokio::test]
    async fn test_list_commits_truncates_to_limit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/alice/widget/commits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                commit_json("ccc", "2024-05-04T00:00:00Z"),
                commit_json("bbb", "2024-05-03T00:00:00Z"),
            ])))
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        let commits = gateway
            .list_commits("alice", "widget", None, Some(1))
            .await
            .ok()
            .unwrap();

        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].sha, "ccc");
    }

    #[tokio::test]
    async fn test_list_commits_classifies_empty_repository() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/alice/blank/commits"))
            .respond_with(
                ResponseTemplate::new(409).set_body_string(r#"{"message":"Git Repository is empty."}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        assert_eq!(
            gateway.list_commits("alice", "blank", None, None).await,
            FetchOutcome::Empty
        );
    }

    #[tokio::test]
    async fn test_list_commits_classifies_forbidden() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/alice/private/commits"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Repository access blocked"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        assert_eq!(
            gateway.list_commits("alice", "private", None, None).await,
            FetchOutcome::Forbidden
        );
    }

    // ==================== rate limit / credentials tests ====================

    #[tokio::test]
    async fn test_rate_limit_status_parses_core_quota() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resources": {
                    "core": { "limit": 5000, "remaining": 4321, "reset": 1714521600, "used": 679 }
                }
            })))
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        let status = gateway.rate_limit_status().await.ok().unwrap();

        assert_eq!(status.limit, 5000);
        assert_eq!(status.remaining, 4321);
        assert_eq!(status.reset_at.timestamp(), 1714521600);
    }

    #[tokio::test]
    async fn test_validate_credentials_returns_login() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "login": "alice" })),
            )
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        assert_eq!(
            gateway.validate_credentials().await,
            FetchOutcome::Ok("alice".to_string())
        );
    }

    #[tokio::test]
    async fn test_validate_credentials_unauthorized_is_transport_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let gateway = create_test_gateway(&mock_server);
        assert!(gateway.validate_credentials().await.is_transient());
    }
}
