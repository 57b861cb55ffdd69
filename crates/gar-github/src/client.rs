//! REST client with authentication, retries, pagination and a per-run cache.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, LINK, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::GitHubError;
use crate::model::User;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
/// Default request timeout for API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// GitHub stops serving search results past this many hits.
pub const SEARCH_RESULT_CAP: u64 = 1000;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: &str = "100";

/// How transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// One fetched page: its JSON body and the `rel="next"` link, if any.
#[derive(Debug, Clone)]
struct Page {
    body: Value,
    next: Option<String>,
}

/// Pages already fetched during this run, keyed by URL.
///
/// Searches overlap heavily (a PR authored and merged in the window shows up
/// twice), so per-item lookups hit the cache instead of the API.
#[derive(Debug, Default)]
struct ResponseCache {
    pages: HashMap<String, Page>,
}

/// Hits from a search endpoint, all pages merged.
#[derive(Debug, Clone)]
pub struct SearchResults<T> {
    pub total_count: u64,
    pub incomplete: bool,
    pub items: Vec<T>,
}

impl<T> SearchResults<T> {
    /// True when GitHub reported more hits than it returned.
    pub fn truncated(&self) -> bool {
        self.incomplete || (self.items.len() as u64) < self.total_count
    }
}

#[derive(Deserialize)]
struct SearchPage {
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    items: Vec<Value>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// GitHub REST API client.
///
/// One client serves one invocation; its response cache lives as long as it
/// does.
pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    config: ClientConfig,
    cache: Mutex<ResponseCache>,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.config.api_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Creates a client authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if the
    /// HTTP client fails to build.
    pub fn new(token: impl Into<String>, config: ClientConfig) -> Result<Self, GitHubError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(GitHubError::InvalidToken {
                reason: "token cannot be empty",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(GitHubError::ClientBuild)?;

        Ok(Self {
            http,
            token,
            config: ClientConfig {
                api_url: config.api_url.trim_end_matches('/').to_string(),
                ..config
            },
            cache: Mutex::new(ResponseCache::default()),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    /// Login of the account the token belongs to.
    pub async fn authenticated_user(&self) -> Result<String, GitHubError> {
        let user: User = self.get("/user", &[]).await?;
        Ok(user.login)
    }

    /// Fetches a single JSON document.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, GitHubError> {
        let url = self.endpoint(path, params)?;
        let page = self.page(&url).await?;
        decode(&url, page.body)
    }

    /// Fetches every page of a list endpoint.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, GitHubError> {
        let mut params = params.to_vec();
        params.push(("per_page", PER_PAGE));
        let mut next = Some(self.endpoint(path, &params)?);
        let mut visited = HashSet::new();
        let mut items = Vec::new();

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                tracing::warn!(path, %url, "pagination links loop back");
                break;
            }
            let page = self.page(&url).await?;
            let batch: Vec<T> = decode(&url, page.body)?;
            items.extend(batch);
            next = page.next;
        }
        tracing::trace!(path, pages = visited.len(), items = items.len(), "listed");
        Ok(items)
    }

    /// Runs a search query (`endpoint` is `issues` or `commits`) and
    /// collects every page.
    pub async fn search<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<SearchResults<T>, GitHubError> {
        tracing::debug!(endpoint, query, "search");
        let path = format!("/search/{endpoint}");
        let mut next = Some(self.endpoint(&path, &[("q", query), ("per_page", PER_PAGE)])?);
        let mut visited = HashSet::new();
        let mut results = SearchResults {
            total_count: 0,
            incomplete: false,
            items: Vec::new(),
        };

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                tracing::warn!(query, %url, "pagination links loop back");
                break;
            }
            let page = self.page(&url).await?;
            let search: SearchPage = decode(&url, page.body)?;
            results.total_count = results.total_count.max(search.total_count);
            results.incomplete |= search.incomplete_results;
            for item in search.items {
                results.items.push(decode(&url, item)?);
            }
            next = page.next;
        }

        if results.total_count > SEARCH_RESULT_CAP {
            tracing::warn!(
                query,
                total = results.total_count,
                "search hit the result cap; narrow the window or scope"
            );
        }
        Ok(results)
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<String, GitHubError> {
        let base = format!("{}{path}", self.config.api_url);
        let url = if params.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, params)
        };
        url.map(String::from)
            .map_err(|err| GitHubError::InvalidUrl {
                url: base,
                message: err.to_string(),
            })
    }

    async fn page(&self, url: &str) -> Result<Page, GitHubError> {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pages
            .get(url)
            .cloned();
        if let Some(page) = cached {
            tracing::trace!(url, "cache hit");
            return Ok(page);
        }

        let response = self.send(url).await?;
        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_link);
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).map_err(|err| GitHubError::InvalidResponse {
            url: url.to_string(),
            message: err.to_string(),
        })?;

        let page = Page { body, next };
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pages
            .insert(url.to_string(), page.clone());
        Ok(page)
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, GitHubError> {
        let policy = self.config.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .header(ACCEPT, MEDIA_TYPE)
                .header("X-GitHub-Api-Version", API_VERSION)
                .send()
                .await;

            let (reason, wait) = match result {
                Ok(response) => match assess(response.status(), response.headers(), Utc::now()) {
                    Verdict::Success => return Ok(response),
                    Verdict::Retry(wait) => (format!("status {}", response.status()), wait),
                    Verdict::Fail => return Err(error_for(response).await),
                },
                Err(err) if err.is_timeout() || err.is_connect() => (err.to_string(), None),
                Err(err) => return Err(err.into()),
            };

            if attempt >= policy.max_attempts {
                return Err(GitHubError::RetriesExhausted {
                    attempts: attempt,
                    last: reason,
                });
            }
            let delay = wait.map_or_else(|| policy.backoff(attempt), |w| w.min(policy.max_delay));
            tracing::warn!(
                url,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                %reason,
                "retrying GitHub request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Success,
    /// Transient: retry, after the server-suggested wait when there is one.
    Retry(Option<Duration>),
    Fail,
}

fn assess(status: StatusCode, headers: &HeaderMap, now: DateTime<Utc>) -> Verdict {
    if status.is_success() {
        return Verdict::Success;
    }
    let retry_after = header_u64(headers, RETRY_AFTER.as_str()).map(Duration::from_secs);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Verdict::Retry(retry_after);
    }
    if status == StatusCode::FORBIDDEN {
        if retry_after.is_some() {
            return Verdict::Retry(retry_after);
        }
        if header_u64(headers, "x-ratelimit-remaining") == Some(0) {
            let wait = header_u64(headers, "x-ratelimit-reset")
                .and_then(|reset| i64::try_from(reset).ok())
                .and_then(|reset| u64::try_from(reset - now.timestamp()).ok())
                .map(Duration::from_secs);
            return Verdict::Retry(wait);
        }
    }
    Verdict::Fail
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

async fn error_for(response: reqwest::Response) -> GitHubError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|err| err.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body
            }
        });

    match status {
        StatusCode::UNAUTHORIZED => GitHubError::Unauthorized(message),
        StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => GitHubError::NotFound(message),
        StatusCode::FORBIDDEN => GitHubError::Forbidden(message),
        _ => GitHubError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T, GitHubError> {
    serde_json::from_value(value).map_err(|err| GitHubError::InvalidResponse {
        url: url.to_string(),
        message: err.to_string(),
    })
}

/// Extracts the `rel="next"` target from a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|param| param.trim() == "rel=\"next\"")
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}
