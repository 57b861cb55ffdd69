//! Event kind enum as the single source of truth for kind strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of activity the classifier understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    PullRequest,
    Issue,
    Commit,
    Review,
    Comment,
    Triage,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PullRequest => "pull_request",
            Self::Issue => "issue",
            Self::Commit => "commit",
            Self::Review => "review",
            Self::Comment => "comment",
            Self::Triage => "triage",
        }
    }

    /// Participation events hang off a pull request or issue.
    pub const fn is_participation(self) -> bool {
        matches!(self, Self::Review | Self::Comment | Self::Triage)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull_request" | "pr" => Ok(Self::PullRequest),
            "issue" => Ok(Self::Issue),
            "commit" => Ok(Self::Commit),
            "review" => Ok(Self::Review),
            "comment" => Ok(Self::Comment),
            "triage" => Ok(Self::Triage),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event kind strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

/// The kind as reported by the source.
///
/// Sources hand over whatever kind name they saw; anything outside
/// [`EventKind`] stays [`RawKind::Unrecognized`] so the classifier can drop
/// it with a warning instead of failing the fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawKind {
    Known(EventKind),
    Unrecognized(String),
}

impl RawKind {
    pub const fn known(&self) -> Option<EventKind> {
        match self {
            Self::Known(kind) => Some(*kind),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<EventKind> for RawKind {
    fn from(kind: EventKind) -> Self {
        Self::Known(kind)
    }
}

impl From<&str> for RawKind {
    fn from(s: &str) -> Self {
        s.parse()
            .map_or_else(|UnknownEventKind(name)| Self::Unrecognized(name), Self::Known)
    }
}

impl fmt::Display for RawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(kind) => kind.fmt(f),
            Self::Unrecognized(name) => f.write_str(name),
        }
    }
}

impl Serialize for RawKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RawKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}
