//! Sources for the inbox: notifications, recent items in watched
//! repositories, and mentions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use gar_core::{Login, Scope};
use serde::Serialize;

use crate::client::{DEFAULT_API_URL, GitHubClient, SearchResults};
use crate::error::GitHubError;
use crate::model::{IssueItem, Notification, login_of};

/// Notification reasons worth surfacing.
const RELEVANT_REASONS: &[&str] = &[
    "review_requested",
    "mention",
    "team_mention",
    "assign",
    "author",
    "comment",
];

/// One line of the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxItem {
    pub repo: String,
    /// `PR`, `Issue`, or GitHub's subject type for anything else.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Why the item is here: a notification reason, `watching`, `mention`
    /// or `author`.
    pub reason: String,
}

impl InboxItem {
    fn from_issue(item: &IssueItem, reason: &str) -> Self {
        Self {
            repo: item.repo(),
            kind: if item.is_pull_request() { "PR" } else { "Issue" }.to_string(),
            number: Some(item.number),
            title: item.title.clone(),
            url: item.html_url.clone(),
            author: Some(login_of(item.user.as_ref()).to_string()),
            updated_at: item.updated_at,
            reason: reason.to_string(),
        }
    }

    fn from_notification(notification: &Notification, web_base: &str) -> Self {
        let repo = notification.repository.full_name.clone();
        let subject = &notification.subject;
        let url = subject.url.as_deref().map_or_else(
            || format!("{web_base}/{repo}"),
            |api| web_url(web_base, api),
        );
        let number = subject
            .url
            .as_deref()
            .and_then(|api| api.rsplit('/').next())
            .and_then(|last| last.parse().ok());
        let kind = match subject.kind.as_str() {
            "PullRequest" => "PR",
            "Issue" => "Issue",
            other => other,
        };
        Self {
            repo,
            kind: kind.to_string(),
            number,
            title: subject.title.clone(),
            url,
            author: None,
            updated_at: notification.updated_at,
            reason: notification.reason.clone(),
        }
    }
}

/// Browser base URL for an API base URL.
fn web_base(api_url: &str) -> String {
    if api_url == DEFAULT_API_URL {
        "https://github.com".to_string()
    } else {
        api_url.trim_end_matches("/api/v3").to_string()
    }
}

/// Converts a subject API URL (`.../repos/o/r/pulls/5`) to its web page.
fn web_url(web_base: &str, api_url: &str) -> String {
    let Some((_, path)) = api_url.split_once("/repos/") else {
        return api_url.to_string();
    };
    format!("{web_base}/{}", path.replacen("/pulls/", "/pull/", 1))
}

fn search_since(since: DateTime<Utc>) -> String {
    since.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn mention_query(user: &Login, scope: &Scope, since: DateTime<Utc>) -> String {
    format!(
        "(mentions:{user} OR author:{user}) updated:>{} {}",
        search_since(since),
        scope.qualifier()
    )
}

impl GitHubClient {
    /// Unread notifications updated since `since`, limited to the reasons
    /// that need attention.
    pub async fn notifications(&self, since: DateTime<Utc>) -> Result<Vec<InboxItem>, GitHubError> {
        let since = since.to_rfc3339();
        let notifications: Vec<Notification> = self
            .get_all("/notifications", &[("since", since.as_str())])
            .await?;
        let web = web_base(self.api_url());
        Ok(notifications
            .iter()
            .filter(|n| RELEVANT_REASONS.contains(&n.reason.as_str()))
            .map(|n| InboxItem::from_notification(n, &web))
            .collect())
    }

    /// Every pull request and issue in the scope updated since `since`.
    pub async fn recent_items(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboxItem>, GitHubError> {
        let items: Vec<IssueItem> = match scope {
            Scope::Repository { owner, name } => {
                let since = since.to_rfc3339();
                self.get_all(
                    &format!("/repos/{owner}/{name}/issues"),
                    &[("since", since.as_str()), ("state", "all"), ("sort", "updated")],
                )
                .await?
            }
            Scope::Organization(_) => {
                let query = format!("{} updated:>{}", scope.qualifier(), search_since(since));
                let results: SearchResults<IssueItem> = self.search("issues", &query).await?;
                results.items
            }
        };
        Ok(items
            .iter()
            .map(|item| InboxItem::from_issue(item, "watching"))
            .collect())
    }

    /// Items in the scope mentioning or opened by `user`, updated since
    /// `since`.
    pub async fn mentions(
        &self,
        user: &Login,
        scope: &Scope,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboxItem>, GitHubError> {
        let query = mention_query(user, scope, since);
        let results: SearchResults<IssueItem> = self.search("issues", &query).await?;
        Ok(results
            .items
            .iter()
            .map(|item| {
                let reason = if user.matches(login_of(item.user.as_ref())) {
                    "author"
                } else {
                    "mention"
                };
                InboxItem::from_issue(item, reason)
            })
            .collect())
    }
}

/// Drops repeated URLs (first wins) and orders by repository, then most
/// recently updated.
pub fn merge(items: Vec<InboxItem>) -> Vec<InboxItem> {
    let mut seen = HashSet::new();
    let mut merged: Vec<InboxItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.url.clone()))
        .collect();
    merged.sort_by(|a, b| {
        a.repo
            .cmp(&b.repo)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    merged
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test_server::{Reply, TestServer};

    fn item(repo: &str, number: u64, day: u32) -> InboxItem {
        InboxItem {
            repo: repo.into(),
            kind: "PR".into(),
            number: Some(number),
            title: format!("item {number}"),
            url: format!("https://github.com/{repo}/pull/{number}"),
            author: None,
            updated_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            reason: "watching".into(),
        }
    }

    #[test]
    fn merge_dedups_and_sorts() {
        let mut mention = item("octo/b", 1, 2);
        mention.reason = "mention".into();
        let merged = merge(vec![
            item("octo/b", 2, 3),
            item("octo/a", 5, 1),
            item("octo/b", 1, 2),
            mention,
            item("octo/a", 6, 4),
        ]);
        let keys: Vec<_> = merged
            .iter()
            .map(|i| (i.repo.as_str(), i.number.unwrap()))
            .collect();
        assert_eq!(
            keys,
            [("octo/a", 6), ("octo/a", 5), ("octo/b", 2), ("octo/b", 1)]
        );
        assert_eq!(merged[3].reason, "watching");
    }

    #[test]
    fn subject_urls_become_web_urls() {
        let web = web_base(DEFAULT_API_URL);
        assert_eq!(
            web_url(&web, "https://api.github.com/repos/octo/widgets/pulls/5"),
            "https://github.com/octo/widgets/pull/5"
        );
        assert_eq!(
            web_url(&web, "https://api.github.com/repos/octo/widgets/issues/9"),
            "https://github.com/octo/widgets/issues/9"
        );
        assert_eq!(
            web_base("https://ghe.example.com/api/v3"),
            "https://ghe.example.com"
        );
    }

    #[test]
    fn notification_mapping() {
        let notification: Notification = serde_json::from_str(
            r#"{
                "reason": "review_requested",
                "updated_at": "2024-01-05T12:00:00Z",
                "subject": {
                    "title": "Add retries",
                    "url": "https://api.github.com/repos/octo/widgets/pulls/42",
                    "type": "PullRequest"
                },
                "repository": {"full_name": "octo/widgets"}
            }"#,
        )
        .unwrap();
        let item = InboxItem::from_notification(&notification, "https://github.com");
        assert_eq!(item.kind, "PR");
        assert_eq!(item.number, Some(42));
        assert_eq!(item.url, "https://github.com/octo/widgets/pull/42");
        assert_eq!(item.reason, "review_requested");
    }

    #[test]
    fn mention_query_includes_own_items() {
        let since = Utc.with_ymd_and_hms(2024, 1, 5, 8, 30, 0).unwrap();
        let query = mention_query(
            &Login::new("alice").unwrap(),
            &"octo/widgets".parse().unwrap(),
            since,
        );
        assert_eq!(
            query,
            "(mentions:alice OR author:alice) updated:>2024-01-05T08:30:00Z repo:octo/widgets"
        );
    }

    #[tokio::test]
    async fn mentions_tell_own_items_apart() {
        let server = TestServer::start(vec![(
            "/search/issues",
            Reply::ok(
                r#"{"total_count": 2, "incomplete_results": false, "items": [
                    {"number": 7, "title": "Ping", "state": "open",
                     "html_url": "https://github.com/octo/widgets/issues/7",
                     "user": {"login": "bob"},
                     "created_at": "2024-01-05T09:00:00Z", "updated_at": "2024-01-05T09:00:00Z",
                     "repository_url": "https://api.github.com/repos/octo/widgets"},
                    {"number": 8, "title": "Mine", "state": "open",
                     "html_url": "https://github.com/octo/widgets/pull/8",
                     "user": {"login": "Alice"},
                     "created_at": "2024-01-05T10:00:00Z", "updated_at": "2024-01-05T10:00:00Z",
                     "repository_url": "https://api.github.com/repos/octo/widgets",
                     "pull_request": {}}
                ]}"#,
            ),
        )])
        .await;
        let since = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();

        let items = server
            .client(1)
            .mentions(
                &Login::new("alice").unwrap(),
                &"octo/widgets".parse().unwrap(),
                since,
            )
            .await
            .unwrap();
        let reasons: Vec<_> = items.iter().map(|i| (i.number, i.kind.as_str(), i.reason.as_str())).collect();
        assert_eq!(
            reasons,
            [(Some(7), "Issue", "mention"), (Some(8), "PR", "author")]
        );
        assert!(server.requests()[0].contains("q=%28mentions%3Aalice+OR+author%3Aalice%29"));
    }
}
