//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A scope string did not look like `owner/name` or `org`.
    #[error("invalid scope `{value}`: expected `owner/repo` or an organization name")]
    InvalidScope { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated event identifier.
    ///
    /// Event IDs must be non-empty and stable across queries: the same pull
    /// request returned by two different searches carries the same ID, which
    /// is what lets the classifier collapse duplicates.
    EventId, "event ID"
);

impl EventId {
    /// ID of a pull request or issue (`owner/repo#12`).
    ///
    /// GitHub numbers pull requests and issues from one sequence per
    /// repository, so the same shape identifies either.
    pub fn item(repo: &str, number: u64) -> Self {
        Self(format!("{repo}#{number}"))
    }

    /// ID of a commit (`owner/repo@sha`).
    pub fn commit(repo: &str, sha: &str) -> Self {
        Self(format!("{repo}@{sha}"))
    }

    /// ID of an event subordinate to a pull request or issue
    /// (`owner/repo#12/review/991`).
    pub fn child(parent: &Self, kind: &str, id: u64) -> Self {
        Self(format!("{parent}/{kind}/{id}"))
    }
}

define_string_id!(
    /// A validated GitHub login.
    Login, "login"
);

impl Login {
    /// Case-insensitive comparison, matching how GitHub treats logins.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

/// A repository or organization against which activity is queried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    /// A single repository, `owner/name`.
    Repository { owner: String, name: String },
    /// Every repository of an organization or user account.
    Organization(String),
}

impl Scope {
    /// The search qualifier restricting a query to this scope.
    pub fn qualifier(&self) -> String {
        match self {
            Self::Repository { owner, name } => format!("repo:{owner}/{name}"),
            Self::Organization(org) => format!("org:{org}"),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository { owner, name } => write!(f, "{owner}/{name}"),
            Self::Organization(org) => write!(f, "{org}"),
        }
    }
}

impl FromStr for Scope {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "scope" });
        }
        let invalid = || ValidationError::InvalidScope {
            value: s.to_string(),
        };
        match trimmed.split_once('/') {
            None => Ok(Self::Organization(trimmed.to_string())),
            Some((owner, name)) => {
                if owner.is_empty() || name.is_empty() || name.contains('/') {
                    return Err(invalid());
                }
                Ok(Self::Repository {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}
