//! Core domain logic for the GitHub activity reporter.
//!
//! This crate contains:
//! - Events: the raw activity records a source returns
//! - Classification: the ordered rules that turn events into report sections
//! - The source seam and the fetch-then-classify pipeline

pub mod classify;
pub mod event;
pub mod event_kind;
pub mod report;
pub mod source;
pub mod types;
pub mod window;

pub use classify::{Placement, RULES, classify};
pub use event::{ActivityEvent, Involvement, ParentRef};
pub use event_kind::{EventKind, RawKind, UnknownEventKind};
pub use report::{Category, DropStats, Report, ReportEntry, Warning, WarningOrigin};
pub use source::{ActivitySource, ScopeActivity, SourceError, gather};
pub use types::{EventId, Login, Scope, ValidationError};
pub use window::{DateWindow, WindowError};
