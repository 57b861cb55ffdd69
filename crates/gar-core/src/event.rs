//! Raw activity events returned by a source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event_kind::{EventKind, RawKind};
use crate::types::{EventId, Login};
use crate::window::DateWindow;

/// One unit of activity as fetched from the hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Stable identifier; the same item found by two queries shares it.
    pub id: EventId,
    pub kind: RawKind,
    /// Repository full name, `owner/name`.
    pub repo: String,
    /// Author login. Deleted accounts come through as `ghost`.
    pub author: String,
    /// Pull request or issue number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    /// Title for pull requests and issues, first message line for commits,
    /// short summary for participation events.
    pub title: String,
    pub url: String,
    /// Lower-case state: `open`, `closed`, `merged`, or a review verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Triage verb (`labeled`, `merged`, ...), when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// How the user was involved with an issue they did not author.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub involvement: Vec<Involvement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
}

/// Back-reference from a subordinate event to its pull request or issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: EventId,
    pub kind: EventKind,
    pub number: u64,
    /// Author of the parent, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub title: String,
    pub url: String,
}

/// Ways a user can be involved with someone else's issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Involvement {
    Commented,
    Mentioned,
    Assigned,
}

impl Involvement {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commented => "commented",
            Self::Mentioned => "mentioned",
            Self::Assigned => "assigned",
        }
    }
}

impl ActivityEvent {
    /// Builds an event with the required fields; optional fields start empty.
    pub fn new(
        id: EventId,
        kind: impl Into<RawKind>,
        repo: impl Into<String>,
        author: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: kind.into(),
            repo: repo.into(),
            author: author.into(),
            number: None,
            title: String::new(),
            url: String::new(),
            state: None,
            action: None,
            created_at,
            updated_at: None,
            merged_at: None,
            closed_at: None,
            involvement: Vec::new(),
            parent: None,
        }
    }

    pub fn is_authored_by(&self, user: &Login) -> bool {
        user.matches(&self.author)
    }

    /// Timestamps that count as activity for this event's kind.
    ///
    /// Pull requests count when created or merged, issues when created or
    /// closed. Issues the user did not author also count when updated, since
    /// the user's engagement is what put them in the result set. Everything
    /// else counts at creation (authored date, review submission).
    pub fn relevant_times(&self, user: &Login) -> Vec<DateTime<Utc>> {
        let mut times = vec![self.created_at];
        match self.kind.known() {
            Some(EventKind::PullRequest) => times.extend(self.merged_at),
            Some(EventKind::Issue) => {
                times.extend(self.closed_at);
                if !self.is_authored_by(user) {
                    times.extend(self.updated_at);
                }
            }
            _ => {}
        }
        times
    }

    /// The latest relevant timestamp inside the window, if any.
    pub fn activity_time(&self, user: &Login, window: &DateWindow) -> Option<DateTime<Utc>> {
        self.relevant_times(user)
            .into_iter()
            .filter(|t| window.contains(*t))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn event_serialization_roundtrip() {
        let mut event = ActivityEvent::new(
            EventId::item("org/repo", 12),
            EventKind::PullRequest,
            "org/repo",
            "alice",
            Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(),
        );
        event.number = Some(12);
        event.title = "Add parser".into();

        let json = serde_json::to_string(&event).unwrap();
        let parsed: ActivityEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, event);
    }

    #[test]
    fn event_rejects_empty_ids() {
        let json = r#"{
            "id": "",
            "kind": "commit",
            "repo": "org/repo",
            "author": "alice",
            "title": "",
            "url": "",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let result: Result<ActivityEvent, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn merged_pull_request_counts_in_merge_window() {
        let user = Login::new("alice").unwrap();
        let mut pr = ActivityEvent::new(
            EventId::item("org/repo", 3),
            EventKind::PullRequest,
            "org/repo",
            "alice",
            Utc.with_ymd_and_hms(2023, 12, 20, 0, 0, 0).unwrap(),
        );
        assert_eq!(pr.activity_time(&user, &window()), None);

        let merged = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        pr.merged_at = Some(merged);
        assert_eq!(pr.activity_time(&user, &window()), Some(merged));
    }

    #[test]
    fn update_only_counts_for_issues_of_others() {
        let user = Login::new("alice").unwrap();
        let updated = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap();
        let mut issue = ActivityEvent::new(
            EventId::item("org/repo", 8),
            EventKind::Issue,
            "org/repo",
            "bob",
            Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap(),
        );
        issue.updated_at = Some(updated);
        assert_eq!(issue.activity_time(&user, &window()), Some(updated));

        issue.author = "alice".into();
        assert_eq!(issue.activity_time(&user, &window()), None);
    }
}
