//! The categorized activity report.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::event::ActivityEvent;
use crate::types::{Login, Scope};
use crate::window::DateWindow;

/// Report sections, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AuthoredPr,
    ReviewedPr,
    CreatedIssue,
    EngagedIssue,
    OrphanCommit,
    MaintainerAction,
}

impl Category {
    pub const ALL: [Self; 6] = [
        Self::AuthoredPr,
        Self::ReviewedPr,
        Self::CreatedIssue,
        Self::EngagedIssue,
        Self::OrphanCommit,
        Self::MaintainerAction,
    ];

    pub const fn title(self) -> &'static str {
        match self {
            Self::AuthoredPr => "Pull Requests Authored",
            Self::ReviewedPr => "Pull Requests Reviewed",
            Self::CreatedIssue => "Issues Created",
            Self::EngagedIssue => "Issue Engagement",
            Self::OrphanCommit => "Work in Progress",
            Self::MaintainerAction => "Maintainer Actions",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A top-level event with the events nested beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub event: ActivityEvent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ActivityEvent>,
}

/// Where a warning came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", content = "name", rename_all = "snake_case")]
pub enum WarningOrigin {
    /// A fetch for one scope failed or was incomplete.
    Scope(String),
    /// The classifier dropped an event.
    Classifier,
}

/// A non-fatal problem surfaced at the end of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub origin: WarningOrigin,
    pub message: String,
}

impl Warning {
    pub fn scope(scope: &Scope, message: impl Into<String>) -> Self {
        Self {
            origin: WarningOrigin::Scope(scope.to_string()),
            message: message.into(),
        }
    }

    pub fn classifier(message: impl Into<String>) -> Self {
        Self {
            origin: WarningOrigin::Classifier,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            WarningOrigin::Scope(scope) => write!(f, "{scope}: {}", self.message),
            WarningOrigin::Classifier => f.write_str(&self.message),
        }
    }
}

/// Counts of events the classifier discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropStats {
    pub unrecognized: usize,
    pub outside_window: usize,
    pub duplicates: usize,
    pub unplaced: usize,
}

/// Activity for one user over one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub user: Login,
    pub window: DateWindow,
    pub scopes: Vec<Scope>,
    pub sections: BTreeMap<Category, Vec<ReportEntry>>,
    pub warnings: Vec<Warning>,
    pub dropped: DropStats,
}

impl Report {
    /// A report with every category present and empty.
    pub fn empty(user: Login, window: DateWindow, scopes: Vec<Scope>) -> Self {
        Self {
            user,
            window,
            scopes,
            sections: Category::ALL.iter().map(|c| (*c, Vec::new())).collect(),
            warnings: Vec::new(),
            dropped: DropStats::default(),
        }
    }

    pub fn section(&self, category: Category) -> &[ReportEntry] {
        self.sections.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total events placed, top-level and nested.
    pub fn event_count(&self) -> usize {
        self.sections
            .values()
            .flatten()
            .map(|entry| 1 + entry.details.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(Vec::is_empty)
    }

    /// Every placed event with the category it landed in.
    pub fn placed_events(&self) -> impl Iterator<Item = (Category, &ActivityEvent)> {
        self.sections.iter().flat_map(|(category, entries)| {
            entries.iter().flat_map(move |entry| {
                std::iter::once(&entry.event)
                    .chain(entry.details.iter())
                    .map(move |event| (*category, event))
            })
        })
    }
}
