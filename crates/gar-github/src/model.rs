//! Response payloads, limited to the fields gar reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Login shown for deleted accounts.
pub const GHOST: &str = "ghost";

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

pub fn login_of(user: Option<&User>) -> &str {
    user.map_or(GHOST, |u| u.login.as_str())
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryRef {
    pub full_name: String,
}

/// A pull request or issue, as returned by issue search and issue listings.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueItem {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    /// `https://api.github.com/repos/{owner}/{repo}`.
    pub repository_url: String,
    /// Present only on pull requests.
    #[serde(default)]
    pub pull_request: Option<PullRequestMarker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestMarker {
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl IssueItem {
    pub const fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        self.pull_request.as_ref().and_then(|pr| pr.merged_at)
    }

    /// `owner/repo`, taken from the repository API URL.
    pub fn repo(&self) -> String {
        repo_from_api_url(&self.repository_url)
    }
}

/// Last two path segments of a repository API URL.
pub fn repo_from_api_url(url: &str) -> String {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    match (segments.next(), segments.next()) {
        (Some(name), Some(owner)) => format!("{owner}/{name}"),
        _ => url.to_string(),
    }
}

/// A commit from commit search or a pull request's commit list.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitItem {
    pub sha: String,
    pub html_url: String,
    pub commit: CommitDetail,
    /// The linked GitHub account, absent when the email is unmatched.
    pub author: Option<User>,
    /// Only set by commit search.
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: Option<GitSignature>,
    #[serde(default)]
    pub committer: Option<GitSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitSignature {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl CommitItem {
    /// Authored date, falling back to the committer date.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.commit
            .author
            .as_ref()
            .and_then(|sig| sig.date)
            .or_else(|| self.commit.committer.as_ref().and_then(|sig| sig.date))
    }

    pub fn summary(&self) -> &str {
        self.commit.message.lines().next().unwrap_or_default().trim()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub id: u64,
    pub user: Option<User>,
    pub state: String,
    /// Missing on pending reviews.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// An entry from `/issues/{n}/events`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueEvent {
    pub id: u64,
    pub actor: Option<User>,
    pub event: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub label: Option<Label>,
    #[serde(default)]
    pub assignee: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

/// A pull request associated with a commit.
#[derive(Debug, Clone, Deserialize)]
pub struct AssociatedPull {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub reason: String,
    pub updated_at: DateTime<Utc>,
    pub subject: NotificationSubject,
    pub repository: RepositoryRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSubject {
    pub title: String,
    /// API URL of the subject; absent for some subject types.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_from_repository_url() {
        assert_eq!(
            repo_from_api_url("https://api.github.com/repos/octo/widgets"),
            "octo/widgets"
        );
    }

    #[test]
    fn search_item_distinguishes_pull_requests() {
        let json = r#"{
            "number": 7,
            "title": "Fix parser",
            "html_url": "https://github.com/octo/widgets/pull/7",
            "state": "closed",
            "user": {"login": "alice"},
            "created_at": "2024-01-02T10:00:00Z",
            "updated_at": "2024-01-03T10:00:00Z",
            "closed_at": "2024-01-03T10:00:00Z",
            "repository_url": "https://api.github.com/repos/octo/widgets",
            "pull_request": {"merged_at": "2024-01-03T10:00:00Z"}
        }"#;
        let item: IssueItem = serde_json::from_str(json).unwrap();
        assert!(item.is_pull_request());
        assert!(item.merged_at().is_some());
        assert_eq!(item.repo(), "octo/widgets");
    }

    #[test]
    fn commit_summary_is_first_line() {
        let json = r#"{
            "sha": "abc123",
            "html_url": "https://github.com/octo/widgets/commit/abc123",
            "commit": {
                "message": "Add thing\n\nLonger body",
                "author": {"date": "2024-01-02T10:00:00Z"}
            },
            "author": null
        }"#;
        let commit: CommitItem = serde_json::from_str(json).unwrap();
        assert_eq!(commit.summary(), "Add thing");
        assert!(commit.date().is_some());
        assert_eq!(login_of(commit.author.as_ref()), GHOST);
    }
}
