//! OAuth device flow for obtaining a user token without a client secret.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;

/// Client ID of the published gar OAuth app.
pub const DEFAULT_CLIENT_ID: &str = "Ov23liHjQnMws6ypFiTh";
/// Scopes requested at login.
pub const DEFAULT_SCOPES: &[&str] = &["repo", "read:org", "read:user", "notifications"];

const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid client ID: {reason}")]
    InvalidClientId { reason: &'static str },
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("authorization was denied")]
    Denied,
    #[error("device code expired before authorization completed")]
    Expired,
    #[error("GitHub rejected the request ({code}): {description}")]
    Provider { code: String, description: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Codes returned when a device flow starts.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    /// Code the user types at `verification_uri`.
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until `device_code` expires.
    pub expires_in: u64,
    /// Minimum seconds between polls.
    pub interval: u64,
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    interval: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
enum Poll {
    Granted(String),
    Pending,
    /// Back off; GitHub may name the new interval.
    SlowDown(Option<u64>),
}

fn interpret(response: TokenResponse) -> Result<Poll, OAuthError> {
    if let Some(token) = response.access_token.filter(|t| !t.is_empty()) {
        return Ok(Poll::Granted(token));
    }
    match response.error.as_deref() {
        Some("authorization_pending") => Ok(Poll::Pending),
        Some("slow_down") => Ok(Poll::SlowDown(response.interval)),
        Some("expired_token") => Err(OAuthError::Expired),
        Some("access_denied") => Err(OAuthError::Denied),
        Some(code) => Err(OAuthError::Provider {
            code: code.to_string(),
            description: response.error_description.unwrap_or_default(),
        }),
        None => Err(OAuthError::InvalidResponse(
            "neither access_token nor error present".to_string(),
        )),
    }
}

/// GitHub device authorization flow.
pub struct DeviceFlow {
    http: reqwest::Client,
    client_id: String,
    scopes: String,
}

impl fmt::Debug for DeviceFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceFlow")
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl DeviceFlow {
    /// # Errors
    ///
    /// Returns an error if the client ID is blank or the HTTP client fails
    /// to build.
    pub fn new(client_id: impl Into<String>) -> Result<Self, OAuthError> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(OAuthError::InvalidClientId {
                reason: "client ID cannot be empty",
            });
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(OAuthError::ClientBuild)?;
        Ok(Self {
            http,
            client_id,
            scopes: DEFAULT_SCOPES.join(" "),
        })
    }

    /// Starts the flow; show the returned user code to the user.
    pub async fn request_code(&self) -> Result<DeviceCode, OAuthError> {
        let response = self
            .http
            .post(DEVICE_CODE_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scopes.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OAuthError::InvalidResponse(format!("status {status}: {body}")));
        }
        // Errors such as an unknown client ID come back as 200 with an error body.
        if let Ok(TokenResponse {
            error: Some(code),
            error_description,
            ..
        }) = serde_json::from_str::<TokenResponse>(&body)
        {
            return Err(OAuthError::Provider {
                code,
                description: error_description.unwrap_or_default(),
            });
        }
        serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse(err.to_string()))
    }

    /// Polls until the user authorizes, denies, or the code expires.
    pub async fn wait_for_token(&self, code: &DeviceCode) -> Result<String, OAuthError> {
        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = Duration::from_secs(code.interval.max(1));

        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                return Err(OAuthError::Expired);
            }

            let response = self
                .http
                .post(ACCESS_TOKEN_URL)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&[
                    ("client_id", self.client_id.as_str()),
                    ("device_code", code.device_code.as_str()),
                    ("grant_type", GRANT_TYPE),
                ])
                .send()
                .await?;
            let body = response.text().await?;
            let parsed: TokenResponse = serde_json::from_str(&body)
                .map_err(|err| OAuthError::InvalidResponse(err.to_string()))?;

            match interpret(parsed)? {
                Poll::Granted(token) => return Ok(token),
                Poll::Pending => tracing::debug!("authorization pending"),
                Poll::SlowDown(next) => {
                    interval = next.map_or(interval + SLOW_DOWN_STEP, Duration::from_secs);
                    tracing::debug!(interval_secs = interval.as_secs(), "slowing down");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Poll, OAuthError> {
        interpret(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn granted() {
        assert_eq!(
            parse(r#"{"access_token": "gho_abc", "token_type": "bearer", "scope": "repo"}"#)
                .unwrap(),
            Poll::Granted("gho_abc".into())
        );
    }

    #[test]
    fn pending_and_slow_down() {
        assert_eq!(
            parse(r#"{"error": "authorization_pending"}"#).unwrap(),
            Poll::Pending
        );
        assert_eq!(
            parse(r#"{"error": "slow_down", "interval": 10}"#).unwrap(),
            Poll::SlowDown(Some(10))
        );
    }

    #[test]
    fn terminal_errors() {
        assert!(matches!(
            parse(r#"{"error": "expired_token"}"#),
            Err(OAuthError::Expired)
        ));
        assert!(matches!(
            parse(r#"{"error": "access_denied"}"#),
            Err(OAuthError::Denied)
        ));
        let err = parse(r#"{"error": "incorrect_client_credentials", "error_description": "bad id"}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "GitHub rejected the request (incorrect_client_credentials): bad id"
        );
    }

    #[test]
    fn empty_response_is_invalid() {
        assert!(matches!(parse("{}"), Err(OAuthError::InvalidResponse(_))));
    }

    #[test]
    fn rejects_blank_client_id() {
        assert!(matches!(
            DeviceFlow::new(""),
            Err(OAuthError::InvalidClientId { .. })
        ));
    }

    #[test]
    fn device_code_parses() {
        let code: DeviceCode = serde_json::from_str(
            r#"{"device_code": "dc", "user_code": "WDJB-MJHT",
                "verification_uri": "https://github.com/login/device",
                "expires_in": 900, "interval": 5}"#,
        )
        .unwrap();
        assert_eq!(code.user_code, "WDJB-MJHT");
        assert_eq!(code.interval, 5);
    }
}
