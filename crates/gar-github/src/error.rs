//! GitHub client errors.

use gar_core::SourceError;
use thiserror::Error;

/// Errors talking to the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The provided token was empty.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// 401: the credential is missing, invalid or expired.
    #[error("bad credentials: {0}")]
    Unauthorized(String),
    /// 404, or 422 from a search naming an unknown repository.
    #[error("not found: {0}")]
    NotFound(String),
    /// 403 that is not a rate limit.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Any other unsuccessful status.
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },
    /// Transient failures persisted through every attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    /// A request URL could not be built.
    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
    /// Failed to parse response.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

impl From<GitHubError> for SourceError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Unauthorized(message) => Self::Auth(message),
            GitHubError::NotFound(_) => Self::NotFound,
            other => Self::Fetch(other.to_string()),
        }
    }
}
