//! Gemini API integration.
//!
//! Turns a structured activity report into a prose narrative.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Environment variables checked for an API key, in order.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Narrative generation errors.
#[derive(Debug, Error)]
pub enum NarrativeError {
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// The model name was empty.
    #[error("model name cannot be empty")]
    InvalidModel,
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response, quota exhaustion included.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The model returned no text.
    #[error("no narrative text generated")]
    Empty,
}

/// Gemini API client.
pub struct Client {
    http: reqwest::Client,
    api_key: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(api_key: impl Into<String>) -> Result<Self, NarrativeError> {
        let api_key = api_key.into();

        if api_key.is_empty() {
            return Err(NarrativeError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }
        if api_key.trim().is_empty() {
            return Err(NarrativeError::InvalidApiKey {
                reason: "API key cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(NarrativeError::ClientBuild)?;

        Ok(Self { http, api_key })
    }

    /// Builds a client from the first API key variable that is set.
    ///
    /// Returns `Ok(None)` when none is set.
    pub fn from_env() -> Result<Option<Self>, NarrativeError> {
        API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .map(Self::new)
            .transpose()
    }

    /// Generates a narrative from serialized activity data.
    pub async fn narrate(&self, model: &str, activity: &str) -> Result<String, NarrativeError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(NarrativeError::InvalidModel);
        }

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(activity),
                }],
            }],
        };
        tracing::debug!(model, "requesting narrative");

        let response = self
            .http
            .post(format!("{GEMINI_API_URL}/{model}:generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| NarrativeError::Api {
                message: format!("status {status}: {body}"),
            }));
        }

        let payload: GenerateResponse = serde_json::from_str(&body)
            .map_err(|err| NarrativeError::InvalidResponse(err.to_string()))?;
        extract_text(payload)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn extract_text(response: GenerateResponse) -> Result<String, NarrativeError> {
    let text = response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        return Err(NarrativeError::Empty);
    }
    Ok(text.to_string())
}

fn parse_api_error(body: &str) -> Option<NarrativeError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
        #[serde(default)]
        status: Option<String>,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| NarrativeError::Api {
            message: match payload.error.status {
                Some(status) => format!("{status}: {}", payload.error.message),
                None => payload.error.message,
            },
        })
}

fn build_prompt(activity: &str) -> String {
    let lines = [
        "You write short, readable accounts of software development work.",
        "",
        "From the GitHub activity below, write a narrative that:",
        "- opens with a one-paragraph summary of what was accomplished",
        "- groups related work under descriptive headings",
        "- calls out the most significant items (merged pull requests, fixes) by number",
        "- covers review, triage and community work as well as authored changes",
        "- keeps a professional, conversational tone suitable for non-specialists",
        "- closes with a short note on work still in progress",
        "",
        "Only describe activity present in the data.",
        "",
        "Activity:",
        activity,
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_rejects_empty_api_key() {
        assert!(matches!(
            Client::new(""),
            Err(NarrativeError::InvalidApiKey { .. })
        ));
    }

    #[test]
    fn client_rejects_whitespace_api_key() {
        assert!(matches!(
            Client::new("   "),
            Err(NarrativeError::InvalidApiKey { .. })
        ));
    }

    #[test]
    fn client_debug_redacts_api_key() {
        let client = Client::new("secret-key").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn prompt_embeds_activity() {
        let prompt = build_prompt("{\"user\":\"alice\"}");
        assert!(prompt.ends_with("Activity:\n{\"user\":\"alice\"}"));
    }

    #[test]
    fn extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Busy week. "}, {"text": "Shipped retries."}], "role": "model"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Busy week. Shipped retries.");
    }

    #[test]
    fn extract_text_rejects_empty() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert!(matches!(extract_text(response), Err(NarrativeError::Empty)));
    }

    #[test]
    fn parse_api_error_reads_status() {
        let err = parse_api_error(
            r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap();
        assert_eq!(err.to_string(), "API error: RESOURCE_EXHAUSTED: Quota exceeded");
    }
}
