//! Shared utilities for CLI commands.

use std::future::Future;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use gar_core::DateWindow;
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Conservative bound for relative offsets (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parses "N units ago" into an offset.
///
/// Returns `None` when `s` is not relative at all.
fn parse_relative(s: &str) -> Option<Result<(TimeDelta, &'static str)>> {
    let caps = RELATIVE_TIME_RE.captures(s)?;
    Some(relative_offset(&caps[1], &caps[2]))
}

fn relative_offset(count: &str, unit: &str) -> Result<(TimeDelta, &'static str)> {
    let n: i64 = count
        .parse()
        .context("failed to parse number in relative time")?;
    let (unit, minutes_per_unit) = match unit {
        "minute" => ("minute", 1),
        "hour" => ("hour", 60),
        "day" => ("day", 60 * 24),
        "week" => ("week", 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };
    if n > MAX_RELATIVE_MINUTES / minutes_per_unit {
        anyhow::bail!("Relative time value too large: {n} {unit}");
    }
    Ok((TimeDelta::minutes(n * minutes_per_unit), unit))
}

/// Parses a report date.
///
/// Supports:
/// - "2024-01-15"
/// - "today", "yesterday"
/// - "3 days ago", "2 weeks ago"
pub fn parse_date(s: &str, today: NaiveDate) -> Result<NaiveDate> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "today" => return Ok(today),
        "yesterday" => return Ok(today - TimeDelta::days(1)),
        _ => {}
    }
    if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Ok(date);
    }
    match parse_relative(&s) {
        Some(relative) => {
            let (offset, unit) = relative?;
            if matches!(unit, "minute" | "hour") {
                anyhow::bail!("Invalid date: {s}. Relative dates count days or weeks");
            }
            Ok(today - offset)
        }
        None => anyhow::bail!(
            "Invalid date: {s}. Use YYYY-MM-DD, 'today', 'yesterday', or e.g. '3 days ago'"
        ),
    }
}

/// Parse a datetime string as ISO 8601, a plain date (midnight UTC) or
/// relative time.
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    match parse_relative(&s.to_ascii_lowercase()) {
        Some(relative) => Ok(now - relative?.0),
        None => anyhow::bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        ),
    }
}

/// Builds the report window from the date flags.
///
/// The end defaults to `today`; the start defaults to `days` before today.
pub fn resolve_window(
    start: Option<&str>,
    end: Option<&str>,
    days: u32,
    today: NaiveDate,
) -> Result<DateWindow> {
    let end = end
        .map(|s| parse_date(s, today).context("invalid --end-date"))
        .transpose()?
        .unwrap_or(today);
    let start = match start {
        Some(s) => parse_date(s, today).context("invalid --start-date")?,
        None => today
            .checked_sub_days(Days::new(u64::from(days)))
            .with_context(|| format!("invalid --days: {days} days back is out of range"))?,
    };
    Ok(DateWindow::new(start, end)?)
}

/// Runs a future on a current-thread runtime. Ctrl-C abandons it.
pub fn block_on<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize tokio runtime")?;
    runtime.block_on(async {
        tokio::select! {
            result = future => result,
            _ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(parse_date("2024-01-03", today()).unwrap(), date(2024, 1, 3));
        assert_eq!(parse_date("today", today()).unwrap(), today());
        assert_eq!(parse_date("Yesterday", today()).unwrap(), date(2024, 1, 9));
        assert_eq!(parse_date("3 days ago", today()).unwrap(), date(2024, 1, 7));
        assert_eq!(parse_date("1 week ago", today()).unwrap(), date(2024, 1, 3));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("last tuesday", today()).is_err());
        assert!(parse_date("2024-13-01", today()).is_err());
        assert!(parse_date("2 hours ago", today()).is_err());
    }

    #[test]
    fn test_parse_datetime_forms() {
        let now = date(2024, 1, 10).and_hms_opt(12, 0, 0).unwrap().and_utc();
        assert_eq!(
            parse_datetime("2024-01-09T08:30:00Z", now).unwrap(),
            date(2024, 1, 9).and_hms_opt(8, 30, 0).unwrap().and_utc()
        );
        assert_eq!(
            parse_datetime("2 hours ago", now).unwrap(),
            now - TimeDelta::hours(2)
        );
        assert_eq!(
            parse_datetime("2024-01-08", now).unwrap(),
            date(2024, 1, 8).and_hms_opt(0, 0, 0).unwrap().and_utc()
        );
        assert!(parse_datetime("soon", now).is_err());
    }

    #[test]
    fn test_parse_relative_bounds() {
        assert!(parse_date("99999999 weeks ago", today()).is_err());
    }

    #[test]
    fn test_resolve_window_defaults_to_days_back() {
        let window = resolve_window(None, None, 1, today()).unwrap();
        assert_eq!(window.start_date(), date(2024, 1, 9));
        assert_eq!(window.end_date(), today());

        let week = resolve_window(None, Some("yesterday"), 7, today()).unwrap();
        assert_eq!(week.start_date(), date(2024, 1, 3));
        assert_eq!(week.end_date(), date(2024, 1, 9));
    }

    #[test]
    fn test_resolve_window_rejects_out_of_range_days() {
        let err = resolve_window(None, None, u32::MAX, today()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("invalid --days: {} days back is out of range", u32::MAX)
        );
    }

    #[test]
    fn test_resolve_window_rejects_inverted_range() {
        let err = resolve_window(Some("2024-01-08"), Some("2024-01-01"), 1, today()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "start date 2024-01-08 is after end date 2024-01-01"
        );
    }
}
