//! Classification of fetched events into report categories.
//!
//! Events first pass a pre-filter: the kind must be recognized, at least one
//! relevant timestamp must fall inside the window, and only the first copy of
//! an id survives. Each survivor then walks [`RULES`] top to bottom and the
//! first rule that matches decides where it goes: a top-level entry of a
//! category, a member of a group keyed by its parent, or a detail nested
//! under an item that is already top-level.
//!
//! Rule order carries the tie-breaks. `authored-pull-request` sits above
//! `reviewed-pull-request`, so a user reviewing their own pull request never
//! gets it listed twice, and the two commit-in-PR rules sit above
//! `orphan-commit`, so a commit with any known pull request is never counted
//! on its own.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::event::{ActivityEvent, ParentRef};
use crate::event_kind::{EventKind, RawKind};
use crate::report::{Category, Report, ReportEntry, Warning};
use crate::types::{EventId, Login, Scope};
use crate::window::DateWindow;

/// Where a rule puts an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Its own entry in a category.
    Top(Category),
    /// One entry per parent: the most recent member heads it, the rest nest.
    Grouped { category: Category, parent: EventId },
    /// A detail under the top-level item with this id.
    Nested(EventId),
}

/// A named classification rule.
pub struct Rule {
    pub name: &'static str,
    place: fn(&Candidate, &Context<'_>) -> Option<Placement>,
}

/// The rules, in evaluation order.
pub const RULES: &[Rule] = &[
    Rule {
        name: "authored-pull-request",
        place: authored_pull_request,
    },
    Rule {
        name: "reviewed-pull-request",
        place: reviewed_pull_request,
    },
    Rule {
        name: "created-issue",
        place: created_issue,
    },
    Rule {
        name: "engaged-issue",
        place: engaged_issue,
    },
    Rule {
        name: "commit-in-listed-pr",
        place: commit_in_listed_pr,
    },
    Rule {
        name: "commit-in-unlisted-pr",
        place: commit_in_unlisted_pr,
    },
    Rule {
        name: "orphan-commit",
        place: orphan_commit,
    },
    Rule {
        name: "participation-on-listed-item",
        place: participation_on_listed_item,
    },
    Rule {
        name: "review-of-unlisted-pr",
        place: review_of_unlisted_pr,
    },
    Rule {
        name: "comment-on-unlisted-issue",
        place: comment_on_unlisted_issue,
    },
    Rule {
        name: "maintainer-action",
        place: maintainer_action,
    },
    Rule {
        name: "participated-pull-request",
        place: participated_pull_request,
    },
];

/// An event that survived the pre-filter.
pub struct Candidate {
    event: ActivityEvent,
    kind: EventKind,
    at: DateTime<Utc>,
    /// Parent references from every copy of the event, first copy first.
    parents: Vec<ParentRef>,
}

impl Candidate {
    fn is_by(&self, user: &Login) -> bool {
        self.event.is_authored_by(user)
    }

    fn parent(&self, id: &EventId) -> Option<&ParentRef> {
        self.parents.iter().find(|p| &p.id == id)
    }

    fn first_parent(&self) -> Option<&ParentRef> {
        self.parents.first()
    }
}

/// Indexes over the candidate set that rules consult.
pub struct Context<'a> {
    user: &'a Login,
    authored_prs: HashSet<EventId>,
    reviewed_prs: HashSet<EventId>,
    listed_items: HashSet<EventId>,
}

impl<'a> Context<'a> {
    fn build(user: &'a Login, candidates: &[Candidate]) -> Self {
        let mut authored_prs = HashSet::new();
        let mut other_prs = HashSet::new();
        let mut listed_items = HashSet::new();
        for candidate in candidates {
            match candidate.kind {
                EventKind::PullRequest => {
                    if candidate.is_by(user) {
                        authored_prs.insert(candidate.event.id.clone());
                    } else {
                        other_prs.insert(candidate.event.id.clone());
                    }
                    listed_items.insert(candidate.event.id.clone());
                }
                EventKind::Issue => {
                    listed_items.insert(candidate.event.id.clone());
                }
                _ => {}
            }
        }

        // Only pull requests someone else opened can be "reviewed"; the user's
        // own stay authored even when they left a review on them.
        let reviewed_prs = candidates
            .iter()
            .filter(|c| c.kind == EventKind::Review && c.is_by(user))
            .flat_map(|c| c.parents.iter())
            .filter(|p| other_prs.contains(&p.id))
            .map(|p| p.id.clone())
            .collect();

        Self {
            user,
            authored_prs,
            reviewed_prs,
            listed_items,
        }
    }

    fn is_tracked_pr(&self, id: &EventId) -> bool {
        self.authored_prs.contains(id) || self.reviewed_prs.contains(id)
    }

    /// The listed pull request a commit nests under: the lowest-numbered
    /// tracked one, else the lowest-numbered listed one. Ties go by id.
    fn listed_pr_parent<'c>(&self, candidate: &'c Candidate) -> Option<&'c ParentRef> {
        lowest_pr(candidate, |p| self.is_tracked_pr(&p.id))
            .or_else(|| lowest_pr(candidate, |p| self.listed_items.contains(&p.id)))
    }

    fn listed_parent<'c>(&self, candidate: &'c Candidate) -> Option<&'c ParentRef> {
        candidate
            .parents
            .iter()
            .find(|p| self.listed_items.contains(&p.id))
    }

    fn parent_is_someone_elses(&self, parent: &ParentRef) -> bool {
        parent
            .author
            .as_deref()
            .is_none_or(|author| !self.user.matches(author))
    }
}

fn authored_pull_request(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    (c.kind == EventKind::PullRequest && c.is_by(cx.user))
        .then_some(Placement::Top(Category::AuthoredPr))
}

fn reviewed_pull_request(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    (c.kind == EventKind::PullRequest && cx.reviewed_prs.contains(&c.event.id))
        .then_some(Placement::Top(Category::ReviewedPr))
}

fn created_issue(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    (c.kind == EventKind::Issue && c.is_by(cx.user))
        .then_some(Placement::Top(Category::CreatedIssue))
}

fn engaged_issue(c: &Candidate, _cx: &Context<'_>) -> Option<Placement> {
    (c.kind == EventKind::Issue).then_some(Placement::Top(Category::EngagedIssue))
}

/// Lowest-numbered pull request parent passing `keep`, ties broken by id.
fn lowest_pr<'c>(
    candidate: &'c Candidate,
    keep: impl Fn(&ParentRef) -> bool,
) -> Option<&'c ParentRef> {
    candidate
        .parents
        .iter()
        .filter(|p| p.kind == EventKind::PullRequest && keep(*p))
        .min_by(|a, b| a.number.cmp(&b.number).then_with(|| a.id.cmp(&b.id)))
}

fn commit_in_listed_pr(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    if c.kind != EventKind::Commit {
        return None;
    }
    cx.listed_pr_parent(c).map(|p| Placement::Nested(p.id.clone()))
}

fn commit_in_unlisted_pr(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    if c.kind != EventKind::Commit {
        return None;
    }
    let parent = lowest_pr(c, |_| true)?;
    let category = if cx.parent_is_someone_elses(parent) {
        Category::MaintainerAction
    } else {
        Category::AuthoredPr
    };
    Some(Placement::Grouped {
        category,
        parent: parent.id.clone(),
    })
}

fn orphan_commit(c: &Candidate, _cx: &Context<'_>) -> Option<Placement> {
    (c.kind == EventKind::Commit).then_some(Placement::Top(Category::OrphanCommit))
}

fn participation_on_listed_item(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    if !c.kind.is_participation() {
        return None;
    }
    cx.listed_parent(c).map(|p| Placement::Nested(p.id.clone()))
}

fn review_of_unlisted_pr(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    if c.kind != EventKind::Review || !c.is_by(cx.user) {
        return None;
    }
    let parent = c.first_parent()?;
    (parent.kind == EventKind::PullRequest && cx.parent_is_someone_elses(parent)).then(|| {
        Placement::Grouped {
            category: Category::ReviewedPr,
            parent: parent.id.clone(),
        }
    })
}

fn comment_on_unlisted_issue(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    if c.kind != EventKind::Comment || !c.is_by(cx.user) {
        return None;
    }
    let parent = c.first_parent()?;
    (parent.kind == EventKind::Issue && cx.parent_is_someone_elses(parent)).then(|| {
        Placement::Grouped {
            category: Category::EngagedIssue,
            parent: parent.id.clone(),
        }
    })
}

fn maintainer_action(c: &Candidate, cx: &Context<'_>) -> Option<Placement> {
    if !c.kind.is_participation() || !c.is_by(cx.user) {
        return None;
    }
    match c.first_parent() {
        None => Some(Placement::Top(Category::MaintainerAction)),
        Some(parent) => cx
            .parent_is_someone_elses(parent)
            .then(|| Placement::Grouped {
                category: Category::MaintainerAction,
                parent: parent.id.clone(),
            }),
    }
}

fn participated_pull_request(c: &Candidate, _cx: &Context<'_>) -> Option<Placement> {
    (c.kind == EventKind::PullRequest).then_some(Placement::Top(Category::MaintainerAction))
}

fn place(candidate: &Candidate, cx: &Context<'_>) -> Option<(&'static str, Placement)> {
    RULES
        .iter()
        .find_map(|rule| (rule.place)(candidate, cx).map(|placement| (rule.name, placement)))
}

/// Most recent first, then repository, then id.
fn by_recency(a: &Candidate, b: &Candidate) -> Ordering {
    b.at.cmp(&a.at)
        .then_with(|| a.event.repo.cmp(&b.event.repo))
        .then_with(|| a.event.id.cmp(&b.event.id))
}

/// Applies kind, window and duplicate filters, recording what was dropped.
fn prefilter(
    events: Vec<ActivityEvent>,
    user: &Login,
    window: &DateWindow,
    report: &mut Report,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::with_capacity(events.len());
    let mut seen: HashMap<EventId, usize> = HashMap::new();

    for event in events {
        let kind = match &event.kind {
            RawKind::Known(kind) => *kind,
            RawKind::Unrecognized(name) => {
                tracing::warn!(id = %event.id, kind = %name, "dropping event of unrecognized kind");
                report.warnings.push(Warning::classifier(format!(
                    "dropped {}: unrecognized event kind `{name}`",
                    event.id
                )));
                report.dropped.unrecognized += 1;
                continue;
            }
        };

        let Some(at) = event.activity_time(user, window) else {
            tracing::debug!(id = %event.id, "dropping event outside the window");
            report.dropped.outside_window += 1;
            continue;
        };

        if let Some(&index) = seen.get(&event.id) {
            report.dropped.duplicates += 1;
            let existing = &mut candidates[index];
            if let Some(parent) = event.parent {
                if !existing.parents.iter().any(|p| p.id == parent.id) {
                    existing.parents.push(parent);
                }
            }
            continue;
        }

        seen.insert(event.id.clone(), candidates.len());
        let parents = event.parent.iter().cloned().collect();
        candidates.push(Candidate {
            event,
            kind,
            at,
            parents,
        });
    }

    candidates
}

struct Slot {
    category: Category,
    head: Candidate,
    details: Vec<Candidate>,
}

impl Slot {
    fn into_entry(mut self) -> (Category, Candidate, ReportEntry) {
        self.details.sort_by(by_recency);
        let details = self.details.into_iter().map(|c| c.event).collect();
        let entry = ReportEntry {
            event: self.head.event.clone(),
            details,
        };
        (self.category, self.head, entry)
    }
}

/// Classifies fetched events into a report for `user` over `window`.
///
/// Never fails: events that cannot be placed are dropped and recorded in the
/// report's warnings and drop statistics. An empty input yields a report with
/// every category present and empty.
pub fn classify(
    user: &Login,
    window: DateWindow,
    scopes: Vec<Scope>,
    events: Vec<ActivityEvent>,
) -> Report {
    let mut report = Report::empty(user.clone(), window, scopes);
    let candidates = prefilter(events, user, &window, &mut report);
    let cx = Context::build(user, &candidates);

    let mut slots: Vec<Slot> = Vec::new();
    let mut slot_index: HashMap<EventId, usize> = HashMap::new();
    let mut groups: BTreeMap<(Category, EventId), Vec<Candidate>> = BTreeMap::new();
    let mut nested: Vec<(EventId, Candidate)> = Vec::new();

    for candidate in candidates {
        let Some((rule, placement)) = place(&candidate, &cx) else {
            tracing::warn!(id = %candidate.event.id, "no rule placed event");
            report.warnings.push(Warning::classifier(format!(
                "dropped {}: no category for {} by {}",
                candidate.event.id, candidate.kind, candidate.event.author
            )));
            report.dropped.unplaced += 1;
            continue;
        };
        tracing::debug!(id = %candidate.event.id, rule, ?placement, "placed event");

        match placement {
            Placement::Top(category) => {
                slot_index.insert(candidate.event.id.clone(), slots.len());
                slots.push(Slot {
                    category,
                    head: candidate,
                    details: Vec::new(),
                });
            }
            Placement::Grouped { category, parent } => {
                groups.entry((category, parent)).or_default().push(candidate);
            }
            Placement::Nested(parent) => nested.push((parent, candidate)),
        }
    }

    for ((category, parent), mut members) in groups {
        for member in &mut members {
            if let Some(resolved) = member.parent(&parent) {
                member.event.parent = Some(resolved.clone());
            }
        }
        members.sort_by(by_recency);
        let mut members = members.into_iter();
        if let Some(head) = members.next() {
            slots.push(Slot {
                category,
                head,
                details: members.collect(),
            });
        }
    }

    for (parent, mut candidate) in nested {
        // Nested events point at the parent they were filed under, so
        // classifying a report's own events again reproduces it.
        if let Some(resolved) = candidate.parent(&parent) {
            candidate.event.parent = Some(resolved.clone());
        }
        match slot_index.get(&parent) {
            Some(&index) => slots[index].details.push(candidate),
            None => {
                report.warnings.push(Warning::classifier(format!(
                    "dropped {}: parent {parent} is not listed",
                    candidate.event.id
                )));
                report.dropped.unplaced += 1;
            }
        }
    }

    let mut placed: Vec<(Category, Candidate, ReportEntry)> =
        slots.into_iter().map(Slot::into_entry).collect();
    placed.sort_by(|(_, a, _), (_, b, _)| by_recency(a, b));
    for (category, _head, entry) in placed {
        report.sections.entry(category).or_default().push(entry);
    }

    report
}
