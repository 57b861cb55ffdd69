//! Inclusive UTC date windows.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors constructing a [`DateWindow`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("start date {start} is after end date {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
}

/// A report window covering whole UTC days, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub const fn start_date(&self) -> NaiveDate {
        self.start
    }

    pub const fn end_date(&self) -> NaiveDate {
        self.end
    }

    /// First instant of the window (start date, 00:00:00 UTC).
    pub fn start(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant after the window (day after end date, 00:00:00 UTC).
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        (self.end + TimeDelta::days(1)).and_time(NaiveTime::MIN).and_utc()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant < self.end_exclusive()
    }

    /// Search qualifier range, e.g. `2024-01-01..2024-01-07`.
    pub fn search_range(&self) -> String {
        format!(
            "{}..{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}
