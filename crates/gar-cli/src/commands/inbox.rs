//! Inbox command: what needs attention since the last run.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use fs2::FileExt;
use gar_core::{Login, Scope};
use gar_github::{GitHubClient, GitHubError, InboxItem, merge_inbox};
use serde::{Deserialize, Serialize};

use super::util::{block_on, parse_datetime};
use crate::config::{Config, dirs_state_path};
use crate::credentials::resolve_token;

/// Look-back used on the first run.
const DEFAULT_LOOKBACK: TimeDelta = TimeDelta::hours(24);
const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Serialize, Deserialize)]
struct InboxState {
    last_run: DateTime<Utc>,
}

fn state_dir() -> Result<PathBuf> {
    dirs_state_path().context("could not determine state directory")
}

fn load_last_run(dir: &Path) -> Result<Option<DateTime<Utc>>> {
    match fs::read_to_string(dir.join("inbox.json")) {
        Ok(content) => {
            let state: InboxState =
                serde_json::from_str(&content).context("failed to parse inbox.json")?;
            Ok(Some(state.last_run))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("failed to read inbox.json"),
    }
}

fn save_last_run(dir: &Path, last_run: DateTime<Utc>) -> Result<()> {
    fs::create_dir_all(dir).context("failed to create state directory")?;

    let lock_file = File::create(dir.join("inbox.lock")).context("failed to create lock file")?;
    lock_file
        .lock_exclusive()
        .context("failed to acquire lock")?;

    let json = serde_json::to_string_pretty(&InboxState { last_run })
        .context("failed to serialize inbox state")?;
    let tmp = dir.join("inbox.json.tmp");
    fs::write(&tmp, json).context("failed to write inbox state")?;
    fs::rename(&tmp, dir.join("inbox.json")).context("failed to replace inbox.json")?;
    tracing::debug!(%last_run, "recorded inbox run");
    Ok(())
}

/// `--since`, else the last run, else a day back.
fn resolve_since(
    explicit: Option<&str>,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    if let Some(s) = explicit {
        return parse_datetime(s, now).context("invalid --since");
    }
    Ok(last_run.unwrap_or(now - DEFAULT_LOOKBACK))
}

fn parse_scopes(names: &[String]) -> Result<Vec<Scope>> {
    names
        .iter()
        .map(|name| {
            name.parse::<Scope>()
                .with_context(|| format!("invalid scope in config: {name}"))
        })
        .collect()
}

/// Turns a source failure into a warning. A rejected token stays fatal.
fn soft_fail(source: &str, err: GitHubError, warnings: &mut Vec<String>) -> Result<()> {
    if let GitHubError::Unauthorized(message) = err {
        anyhow::bail!("authentication failed: {message}. Run 'gar login' to refresh your token.");
    }
    tracing::warn!(source, error = %err, "inbox source skipped");
    warnings.push(format!("{source}: {err}"));
    Ok(())
}

async fn collect(
    client: &GitHubClient,
    config: &Config,
    since: DateTime<Utc>,
) -> Result<(Vec<InboxItem>, Vec<String>)> {
    let watch_all = parse_scopes(&config.watch_all)?;
    let watch_mentions = parse_scopes(&config.watch_mentions)?;
    let mut items = Vec::new();
    let mut warnings = Vec::new();

    match client.notifications(since).await {
        Ok(found) => items.extend(found),
        Err(err) => soft_fail("notifications", err, &mut warnings)?,
    }

    for scope in &watch_all {
        match client.recent_items(scope, since).await {
            Ok(found) => items.extend(found),
            Err(err) => soft_fail(&scope.to_string(), err, &mut warnings)?,
        }
    }

    if !watch_mentions.is_empty() {
        let user = match &config.username {
            Some(name) => Login::new(name.as_str()).context("invalid username in config")?,
            None => Login::new(
                client
                    .authenticated_user()
                    .await
                    .context("failed to look up the authenticated user")?,
            )?,
        };
        for scope in &watch_mentions {
            match client.mentions(&user, scope, since).await {
                Ok(found) => items.extend(found),
                Err(err) => soft_fail(&scope.to_string(), err, &mut warnings)?,
            }
        }
    }

    Ok((merge_inbox(items), warnings))
}

pub fn run<W: Write>(
    writer: &mut W,
    since: Option<&str>,
    no_update: bool,
    token: Option<&str>,
    config: &Config,
) -> Result<()> {
    let now = Utc::now();
    let state_dir = state_dir()?;
    let since = resolve_since(since, load_last_run(&state_dir)?, now)?;
    let token = resolve_token(token)?;
    let client =
        GitHubClient::new(token, config.client_config()).context("failed to create GitHub client")?;

    tracing::info!(%since, "checking inbox");
    let (items, warnings) = block_on(collect(&client, config, since))?;

    write!(writer, "{}", format_inbox(&items, &warnings, since))?;

    if !no_update {
        save_last_run(&state_dir, now)?;
    }
    Ok(())
}

fn truncate(title: &str) -> String {
    // Count characters, not bytes, so multi-byte titles never split.
    if title.chars().count() > MAX_TITLE_CHARS {
        format!(
            "{}...",
            title.chars().take(MAX_TITLE_CHARS - 3).collect::<String>()
        )
    } else {
        title.to_string()
    }
}

/// Renders inbox items as one table per repository.
pub fn format_inbox(items: &[InboxItem], warnings: &[String], since: DateTime<Utc>) -> String {
    let mut output = String::new();
    let since = since.format("%Y-%m-%d %H:%M UTC");

    if items.is_empty() {
        writeln!(output, "Nothing new since {since}.").unwrap();
    } else {
        writeln!(output, "{} new since {since}", items.len()).unwrap();
        let mut current_repo: Option<&str> = None;
        for item in items {
            if current_repo != Some(item.repo.as_str()) {
                current_repo = Some(item.repo.as_str());
                writeln!(output).unwrap();
                writeln!(output, "{}", item.repo).unwrap();
                writeln!(
                    output,
                    "  {:<5}  {:>6}  {:<16}  {:<16}  Title",
                    "Kind", "Number", "Updated", "Reason"
                )
                .unwrap();
            }
            let number = item.number.map(|n| format!("#{n}")).unwrap_or_default();
            writeln!(
                output,
                "  {:<5}  {:>6}  {:<16}  {:<16}  {}",
                item.kind,
                number,
                item.updated_at.format("%Y-%m-%d %H:%M"),
                item.reason,
                truncate(&item.title)
            )
            .unwrap();
            writeln!(output, "  {:<5}  {:>6}  {:<16}  {:<16}  {}", "", "", "", "", item.url)
                .unwrap();
        }
    }

    if !warnings.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "Warnings:").unwrap();
        for warning in warnings {
            writeln!(output, "- {warning}").unwrap();
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use insta::assert_snapshot;

    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn item(repo: &str, kind: &str, number: u64, title: &str, reason: &str, day: u32) -> InboxItem {
        let path = if kind == "PR" { "pull" } else { "issues" };
        InboxItem {
            repo: repo.into(),
            kind: kind.into(),
            number: Some(number),
            title: title.into(),
            url: format!("https://github.com/{repo}/{path}/{number}"),
            author: None,
            updated_at: at(day, 10),
            reason: reason.into(),
        }
    }

    #[test]
    fn test_format_inbox_groups_by_repository() {
        let items = merge_inbox(vec![
            item("octo/widgets", "Issue", 30, "Crash on empty input", "watching", 7),
            item("acme/api", "PR", 5, "Add retries", "review_requested", 8),
            item("octo/widgets", "PR", 12, "Speed up parser", "mention", 8),
        ]);
        let output = format_inbox(&items, &["octo/private: not found".into()], at(7, 9));
        assert_snapshot!(output, @r"
        3 new since 2024-01-07 09:00 UTC

        acme/api
          Kind   Number  Updated           Reason            Title
          PR         #5  2024-01-08 10:00  review_requested  Add retries
                                                             https://github.com/acme/api/pull/5

        octo/widgets
          Kind   Number  Updated           Reason            Title
          PR        #12  2024-01-08 10:00  mention           Speed up parser
                                                             https://github.com/octo/widgets/pull/12
          Issue     #30  2024-01-07 10:00  watching          Crash on empty input
                                                             https://github.com/octo/widgets/issues/30

        Warnings:
        - octo/private: not found
        ");
    }

    #[test]
    fn test_format_inbox_empty() {
        let output = format_inbox(&[], &[], at(7, 9));
        assert_eq!(output, "Nothing new since 2024-01-07 09:00 UTC.\n");
    }

    #[test]
    fn test_long_titles_are_truncated_by_chars() {
        let title = "é".repeat(80);
        let shown = truncate(&title);
        assert_eq!(shown.chars().count(), MAX_TITLE_CHARS);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_resolve_since_precedence() {
        let now = at(8, 12);
        assert_eq!(resolve_since(None, None, now).unwrap(), at(7, 12));
        assert_eq!(resolve_since(None, Some(at(3, 0)), now).unwrap(), at(3, 0));
        assert_eq!(
            resolve_since(Some("2 days ago"), Some(at(3, 0)), now).unwrap(),
            at(6, 12)
        );
        assert!(resolve_since(Some("whenever"), None, now).is_err());
    }

    #[test]
    fn test_last_run_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        assert!(load_last_run(&state).unwrap().is_none());

        save_last_run(&state, at(8, 12)).unwrap();
        assert_eq!(load_last_run(&state).unwrap(), Some(at(8, 12)));
        assert!(!state.join("inbox.json.tmp").exists());

        save_last_run(&state, at(9, 8)).unwrap();
        assert_eq!(load_last_run(&state).unwrap(), Some(at(9, 8)));
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("inbox.json"), "{").unwrap();
        assert!(load_last_run(dir.path()).is_err());
    }

    #[test]
    fn test_unauthorized_source_is_fatal() {
        let mut warnings = Vec::new();
        soft_fail(
            "notifications",
            GitHubError::Status {
                status: 502,
                message: "bad gateway".into(),
            },
            &mut warnings,
        )
        .unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("notifications: "));

        let err = soft_fail(
            "notifications",
            GitHubError::Unauthorized("Bad credentials".into()),
            &mut warnings,
        )
        .unwrap_err();
        assert!(err.to_string().contains("gar login"));
    }
}
