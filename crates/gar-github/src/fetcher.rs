//! GitHub implementation of [`ActivitySource`].
//!
//! Per scope the fetcher verifies the scope exists, runs the issue and
//! commit searches, expands every hit into its subordinate events (commits,
//! reviews, comments, triage actions) and filters the lot to the window.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use gar_core::{
    ActivityEvent, ActivitySource, DateWindow, EventId, EventKind, Involvement, Login, ParentRef,
    RawKind, Scope, ScopeActivity, SourceError,
};
use serde::de::IgnoredAny;

use crate::client::{GitHubClient, SearchResults};
use crate::error::GitHubError;
use crate::model::{
    AssociatedPull, CommitItem, IssueComment, IssueEvent, IssueItem, Review, User, login_of,
};

/// Issue-event names recorded as maintainer triage.
const TRIAGE_EVENTS: &[&str] = &[
    "labeled",
    "unlabeled",
    "closed",
    "reopened",
    "merged",
    "assigned",
    "unassigned",
    "milestoned",
    "demilestoned",
    "locked",
    "unlocked",
    "marked_as_duplicate",
    "ready_for_review",
    "review_requested",
    "converted_to_draft",
    "transferred",
    "pinned",
    "unpinned",
];

/// Issue-event names that carry no maintainer intent.
const NOISE_EVENTS: &[&str] = &[
    "mentioned",
    "subscribed",
    "unsubscribed",
    "referenced",
    "cross-referenced",
    "head_ref_deleted",
    "head_ref_restored",
    "head_ref_force_pushed",
    "base_ref_changed",
    "base_ref_force_pushed",
    "renamed",
    "comment_deleted",
    "review_request_removed",
    "review_dismissed",
];

/// Fetches a user's activity from the GitHub REST API.
#[derive(Debug)]
pub struct GitHubFetcher {
    client: GitHubClient,
}

impl GitHubFetcher {
    pub const fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    pub const fn client(&self) -> &GitHubClient {
        &self.client
    }

    /// Checks the scope exists and returns the search qualifier for it.
    ///
    /// A bare name is tried as an organization first, then as a user account.
    async fn resolve_qualifier(&self, scope: &Scope) -> Result<String, GitHubError> {
        match scope {
            Scope::Repository { owner, name } => {
                self.client
                    .get::<IgnoredAny>(&format!("/repos/{owner}/{name}"), &[])
                    .await?;
                Ok(scope.qualifier())
            }
            Scope::Organization(org) => {
                match self
                    .client
                    .get::<IgnoredAny>(&format!("/orgs/{org}"), &[])
                    .await
                {
                    Ok(_) => Ok(scope.qualifier()),
                    Err(GitHubError::NotFound(_)) => {
                        self.client
                            .get::<IgnoredAny>(&format!("/users/{org}"), &[])
                            .await?;
                        Ok(format!("user:{org}"))
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}

impl ActivitySource for GitHubFetcher {
    async fn fetch_scope(
        &self,
        scope: &Scope,
        user: &Login,
        window: &DateWindow,
    ) -> Result<ScopeActivity, SourceError> {
        let qualifier = self.resolve_qualifier(scope).await?;
        let queries = Queries::new(user, window, &qualifier);
        let mut run = ScopeRun {
            client: &self.client,
            user,
            window,
            activity: ScopeActivity::default(),
            expanded: HashSet::new(),
            known_commits: HashSet::new(),
        };

        run.authored_pull_requests(&queries).await?;
        run.participated_pull_requests(&queries).await?;
        run.created_issues(&queries).await?;
        run.engaged_issues(&queries).await?;
        run.commits(&queries).await?;

        let ScopeRun { mut activity, .. } = run;
        let before = activity.events.len();
        activity
            .events
            .retain(|event| event.activity_time(user, window).is_some());
        tracing::debug!(
            %scope,
            kept = activity.events.len(),
            dropped = before - activity.events.len(),
            "filtered to window"
        );
        Ok(activity)
    }
}

/// Search queries for one user, window and scope.
#[derive(Debug)]
struct Queries {
    user: String,
    range: String,
    qualifier: String,
}

impl Queries {
    fn new(user: &Login, window: &DateWindow, qualifier: &str) -> Self {
        Self {
            user: user.to_string(),
            range: window.search_range(),
            qualifier: qualifier.to_string(),
        }
    }

    fn build(&self, terms: &str) -> String {
        format!("{terms} {}", self.qualifier)
    }

    fn authored_pull_requests(&self) -> [String; 2] {
        let Self { user, range, .. } = self;
        [
            self.build(&format!("is:pr author:{user} created:{range}")),
            self.build(&format!("is:pr author:{user} merged:{range}")),
        ]
    }

    fn reviewed_pull_requests(&self) -> String {
        let Self { user, range, .. } = self;
        self.build(&format!("is:pr reviewed-by:{user} -author:{user} updated:{range}"))
    }

    fn commented_pull_requests(&self) -> String {
        let Self { user, range, .. } = self;
        self.build(&format!("is:pr commenter:{user} -author:{user} updated:{range}"))
    }

    fn created_issues(&self) -> [String; 2] {
        let Self { user, range, .. } = self;
        [
            self.build(&format!("is:issue author:{user} created:{range}")),
            self.build(&format!("is:issue author:{user} closed:{range}")),
        ]
    }

    fn engaged_issues(&self) -> [(String, Involvement); 3] {
        let Self { user, range, .. } = self;
        [
            ("commenter", Involvement::Commented),
            ("mentions", Involvement::Mentioned),
            ("assignee", Involvement::Assigned),
        ]
        .map(|(qualifier, involvement)| {
            (
                self.build(&format!(
                    "is:issue {qualifier}:{user} -author:{user} updated:{range}"
                )),
                involvement,
            )
        })
    }

    fn commits(&self) -> String {
        let Self { user, range, .. } = self;
        self.build(&format!("author:{user} committer-date:{range}"))
    }
}

/// Mutable state while fetching one scope.
struct ScopeRun<'a> {
    client: &'a GitHubClient,
    user: &'a Login,
    window: &'a DateWindow,
    activity: ScopeActivity,
    /// Items whose subordinate events were already fetched.
    expanded: HashSet<EventId>,
    /// Commits already attached to an authored pull request.
    known_commits: HashSet<String>,
}

impl ScopeRun<'_> {
    async fn search(&mut self, query: &str) -> Result<Vec<IssueItem>, SourceError> {
        let results: SearchResults<IssueItem> = self.client.search("issues", query).await?;
        self.note_truncation(query, &results);
        Ok(results.items)
    }

    fn note_truncation<T>(&mut self, query: &str, results: &SearchResults<T>) {
        if results.truncated() {
            tracing::warn!(
                query,
                total = results.total_count,
                returned = results.items.len(),
                "search results truncated"
            );
            self.activity.notes.push(format!(
                "search `{query}` returned {} of {} results",
                results.items.len(),
                results.total_count
            ));
        }
    }

    /// Records a failed per-item lookup and carries on. Auth failures still
    /// abort the run.
    fn soft<T: Default>(
        &mut self,
        result: Result<T, GitHubError>,
        what: &str,
    ) -> Result<T, SourceError> {
        match result {
            Ok(value) => Ok(value),
            Err(GitHubError::Unauthorized(message)) => Err(SourceError::Auth(message)),
            Err(err) => {
                tracing::warn!(what, error = %err, "lookup failed");
                self.activity
                    .notes
                    .push(format!("could not load {what}: {err}"));
                Ok(T::default())
            }
        }
    }

    async fn authored_pull_requests(&mut self, queries: &Queries) -> Result<(), SourceError> {
        let mut items = Vec::new();
        for query in queries.authored_pull_requests() {
            items.extend(self.search(&query).await?);
        }

        for item in items {
            let event = pull_request_event(&item);
            if !self.expanded.insert(event.id.clone()) {
                continue;
            }
            let repo = item.repo();
            let parent = parent_ref(&item);
            self.activity.events.push(event);

            let path = format!("/repos/{repo}/pulls/{}/commits", item.number);
            let result = self.client.get_all::<CommitItem>(&path, &[]).await;
            let commits = self.soft(result, &format!("commits of {}", parent.id))?;
            let login = self.user;
            for commit in commits
                .iter()
                .filter(|c| login.matches(login_of(c.author.as_ref())))
            {
                self.known_commits.insert(commit.sha.clone());
                self.activity
                    .events
                    .extend(commit_event(&repo, commit, Some(parent.clone())));
            }

            let path = format!("/repos/{repo}/pulls/{}/reviews", item.number);
            let result = self.client.get_all::<Review>(&path, &[]).await;
            let reviews = self.soft(result, &format!("reviews of {}", parent.id))?;
            self.activity.events.extend(
                reviews
                    .iter()
                    .filter_map(|review| review_event(&repo, &parent, review)),
            );
        }
        Ok(())
    }

    async fn participated_pull_requests(&mut self, queries: &Queries) -> Result<(), SourceError> {
        let mut items = self.search(&queries.reviewed_pull_requests()).await?;
        items.extend(self.search(&queries.commented_pull_requests()).await?);

        for item in items {
            let event = pull_request_event(&item);
            if !self.expanded.insert(event.id.clone()) {
                continue;
            }
            self.activity.events.push(event);
            self.participation(&item, true).await?;
        }
        Ok(())
    }

    async fn created_issues(&mut self, queries: &Queries) -> Result<(), SourceError> {
        for query in queries.created_issues() {
            for item in self.search(&query).await? {
                let event = issue_event(&item, &[]);
                if self.expanded.insert(event.id.clone()) {
                    self.activity.events.push(event);
                }
            }
        }
        Ok(())
    }

    async fn engaged_issues(&mut self, queries: &Queries) -> Result<(), SourceError> {
        let mut found: BTreeMap<EventId, (IssueItem, BTreeSet<Involvement>)> = BTreeMap::new();
        for (query, involvement) in queries.engaged_issues() {
            for item in self.search(&query).await? {
                let id = EventId::item(&item.repo(), item.number);
                found
                    .entry(id)
                    .or_insert_with(|| (item, BTreeSet::new()))
                    .1
                    .insert(involvement);
            }
        }

        for (id, (item, involvement)) in found {
            if !self.expanded.insert(id) {
                continue;
            }
            let involvement: Vec<_> = involvement.into_iter().collect();
            self.activity.events.push(issue_event(&item, &involvement));
            self.participation(&item, false).await?;
        }
        Ok(())
    }

    /// The user's reviews, comments and triage actions on someone else's
    /// pull request or issue.
    async fn participation(&mut self, item: &IssueItem, reviews: bool) -> Result<(), SourceError> {
        let repo = item.repo();
        let parent = parent_ref(item);
        let login = self.user;
        let by_user = |user: Option<&User>| login.matches(login_of(user));

        if reviews {
            let path = format!("/repos/{repo}/pulls/{}/reviews", item.number);
            let result = self.client.get_all::<Review>(&path, &[]).await;
            let list = self.soft(result, &format!("reviews of {}", parent.id))?;
            let events: Vec<_> = list
                .iter()
                .filter(|review| by_user(review.user.as_ref()))
                .filter_map(|review| review_event(&repo, &parent, review))
                .collect();
            self.activity.events.extend(events);
        }

        let since = self.window.start().to_rfc3339();
        let path = format!("/repos/{repo}/issues/{}/comments", item.number);
        let result = self
            .client
            .get_all::<IssueComment>(&path, &[("since", since.as_str())])
            .await;
        let comments = self.soft(result, &format!("comments on {}", parent.id))?;
        let events: Vec<_> = comments
            .iter()
            .filter(|comment| by_user(comment.user.as_ref()))
            .map(|comment| comment_event(&repo, &parent, comment))
            .collect();
        self.activity.events.extend(events);

        let path = format!("/repos/{repo}/issues/{}/events", item.number);
        let result = self.client.get_all::<IssueEvent>(&path, &[]).await;
        let timeline = self.soft(result, &format!("events of {}", parent.id))?;
        let events: Vec<_> = timeline
            .iter()
            .filter(|event| by_user(event.actor.as_ref()))
            .filter_map(|event| triage_event(&repo, &parent, event))
            .collect();
        self.activity.events.extend(events);
        Ok(())
    }

    async fn commits(&mut self, queries: &Queries) -> Result<(), SourceError> {
        let query = queries.commits();
        let results: SearchResults<CommitItem> = self.client.search("commits", &query).await?;
        self.note_truncation(&query, &results);

        for commit in results.items {
            if !self.known_commits.insert(commit.sha.clone()) {
                continue;
            }
            let Some(repo) = commit.repository.as_ref().map(|r| r.full_name.clone()) else {
                continue;
            };
            let path = format!("/repos/{repo}/commits/{}/pulls", commit.sha);
            let result = self.client.get_all::<AssociatedPull>(&path, &[]).await;
            let pulls = self.soft(result, &format!("pull requests of {repo}@{}", commit.sha))?;
            self.activity
                .events
                .extend(commit_events(&repo, &commit, &pulls));
        }
        Ok(())
    }
}

fn lowercase(state: &str) -> String {
    state.to_ascii_lowercase()
}

fn item_event(item: &IssueItem, kind: EventKind) -> ActivityEvent {
    let repo = item.repo();
    let mut event = ActivityEvent::new(
        EventId::item(&repo, item.number),
        kind,
        &repo,
        login_of(item.user.as_ref()),
        item.created_at,
    );
    event.number = Some(item.number);
    event.title.clone_from(&item.title);
    event.url.clone_from(&item.html_url);
    event.state = Some(lowercase(&item.state));
    event.updated_at = Some(item.updated_at);
    event.closed_at = item.closed_at;
    event
}

pub(crate) fn pull_request_event(item: &IssueItem) -> ActivityEvent {
    let mut event = item_event(item, EventKind::PullRequest);
    event.merged_at = item.merged_at();
    if event.merged_at.is_some() {
        event.state = Some("merged".to_string());
    }
    event
}

pub(crate) fn issue_event(item: &IssueItem, involvement: &[Involvement]) -> ActivityEvent {
    let mut event = item_event(item, EventKind::Issue);
    event.involvement = involvement.to_vec();
    event
}

pub(crate) fn parent_ref(item: &IssueItem) -> ParentRef {
    ParentRef {
        id: EventId::item(&item.repo(), item.number),
        kind: if item.is_pull_request() {
            EventKind::PullRequest
        } else {
            EventKind::Issue
        },
        number: item.number,
        author: Some(login_of(item.user.as_ref()).to_string()),
        title: item.title.clone(),
        url: item.html_url.clone(),
    }
}

fn associated_parent(repo: &str, pull: &AssociatedPull) -> ParentRef {
    ParentRef {
        id: EventId::item(repo, pull.number),
        kind: EventKind::PullRequest,
        number: pull.number,
        author: Some(login_of(pull.user.as_ref()).to_string()),
        title: pull.title.clone(),
        url: pull.html_url.clone(),
    }
}

/// One event per associated pull request, each naming that pull request as
/// its parent, or a single parentless event when there are none. Picking
/// among the parents is left to classification.
pub(crate) fn commit_events(
    repo: &str,
    commit: &CommitItem,
    pulls: &[AssociatedPull],
) -> Vec<ActivityEvent> {
    if pulls.is_empty() {
        return commit_event(repo, commit, None).into_iter().collect();
    }
    pulls
        .iter()
        .filter_map(|pull| commit_event(repo, commit, Some(associated_parent(repo, pull))))
        .collect()
}

/// `None` when the commit carries no usable date.
pub(crate) fn commit_event(
    repo: &str,
    commit: &CommitItem,
    parent: Option<ParentRef>,
) -> Option<ActivityEvent> {
    let date = commit.date()?;
    let mut event = ActivityEvent::new(
        EventId::commit(repo, &commit.sha),
        EventKind::Commit,
        repo,
        login_of(commit.author.as_ref()),
        date,
    );
    event.title = commit.summary().to_string();
    event.url.clone_from(&commit.html_url);
    event.parent = parent;
    Some(event)
}

fn child_event(
    repo: &str,
    parent: &ParentRef,
    kind: impl Into<RawKind>,
    id: EventId,
    author: &str,
    at: DateTime<Utc>,
) -> ActivityEvent {
    let mut event = ActivityEvent::new(id, kind, repo, author, at);
    event.number = Some(parent.number);
    event.title.clone_from(&parent.title);
    event.parent = Some(parent.clone());
    event
}

/// `None` for pending reviews.
pub(crate) fn review_event(repo: &str, parent: &ParentRef, review: &Review) -> Option<ActivityEvent> {
    let submitted = review.submitted_at?;
    if review.state.eq_ignore_ascii_case("pending") {
        return None;
    }
    let mut event = child_event(
        repo,
        parent,
        EventKind::Review,
        EventId::child(&parent.id, "review", review.id),
        login_of(review.user.as_ref()),
        submitted,
    );
    event.url.clone_from(&review.html_url);
    event.state = Some(lowercase(&review.state));
    Some(event)
}

pub(crate) fn comment_event(repo: &str, parent: &ParentRef, comment: &IssueComment) -> ActivityEvent {
    let mut event = child_event(
        repo,
        parent,
        EventKind::Comment,
        EventId::child(&parent.id, "comment", comment.id),
        login_of(comment.user.as_ref()),
        comment.created_at,
    );
    event.url.clone_from(&comment.html_url);
    event.action = Some("commented".to_string());
    event
}

/// Maps an issue event to a triage event. Noise is skipped; names outside
/// the triage vocabulary come through as unrecognized kinds.
pub(crate) fn triage_event(repo: &str, parent: &ParentRef, issue_event: &IssueEvent) -> Option<ActivityEvent> {
    let name = issue_event.event.as_str();
    if NOISE_EVENTS.contains(&name) {
        return None;
    }
    let kind = if TRIAGE_EVENTS.contains(&name) {
        RawKind::Known(EventKind::Triage)
    } else {
        RawKind::Unrecognized(format!("issue_event:{name}"))
    };
    let mut event = child_event(
        repo,
        parent,
        kind,
        EventId::child(&parent.id, "event", issue_event.id),
        login_of(issue_event.actor.as_ref()),
        issue_event.created_at,
    );
    event.url.clone_from(&parent.url);
    event.action = Some(match (&issue_event.label, &issue_event.assignee) {
        (Some(label), _) => format!("{name} `{}`", label.name),
        (None, Some(assignee)) => format!("{name} @{}", assignee.login),
        (None, None) => name.to_string(),
    });
    Some(event)
}
