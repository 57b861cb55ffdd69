//! The seam between fetching and classification.
//!
//! A source fetches one scope at a time. [`gather`] walks the scope list in
//! order, appends whatever each scope yields, turns per-scope failures into
//! report warnings, and hands the merged events to the classifier. Only an
//! authentication failure aborts the run.

use thiserror::Error;

use crate::classify::classify;
use crate::event::ActivityEvent;
use crate::report::{Report, Warning};
use crate::types::{Login, Scope};
use crate::window::DateWindow;

/// Failures a source can report for a scope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The credential is invalid or expired. Fatal for the whole run.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The scope does not exist or the credential cannot see it.
    #[error("not found or not accessible")]
    NotFound,
    /// The scope could not be fetched, retries included.
    #[error("fetch failed: {0}")]
    Fetch(String),
}

impl SourceError {
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Everything one scope produced.
#[derive(Debug, Default, Clone)]
pub struct ScopeActivity {
    pub events: Vec<ActivityEvent>,
    /// Non-fatal problems, such as truncated search results.
    pub notes: Vec<String>,
}

/// Something that can fetch activity for a user, window and scope.
#[expect(
    async_fn_in_trait,
    reason = "sources are driven from a current-thread runtime"
)]
pub trait ActivitySource {
    async fn fetch_scope(
        &self,
        scope: &Scope,
        user: &Login,
        window: &DateWindow,
    ) -> Result<ScopeActivity, SourceError>;
}

/// Fetches every scope in order and classifies the merged result.
pub async fn gather<S: ActivitySource>(
    source: &S,
    user: &Login,
    window: DateWindow,
    scopes: &[Scope],
) -> Result<Report, SourceError> {
    let mut events = Vec::new();
    let mut warnings = Vec::new();

    for scope in scopes {
        tracing::info!(%scope, "fetching activity");
        match source.fetch_scope(scope, user, &window).await {
            Ok(activity) => {
                tracing::debug!(%scope, events = activity.events.len(), "scope fetched");
                events.extend(activity.events);
                warnings.extend(
                    activity
                        .notes
                        .into_iter()
                        .map(|note| Warning::scope(scope, note)),
                );
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(%scope, error = %err, "scope skipped");
                warnings.push(Warning::scope(scope, err.to_string()));
            }
        }
    }

    let mut report = classify(user, window, scopes.to_vec(), events);
    warnings.append(&mut report.warnings);
    report.warnings = warnings;
    Ok(report)
}
