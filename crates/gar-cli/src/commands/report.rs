//! Report command: fetch, classify and render a user's activity.
//!
//! This module implements `gar report` with Markdown (default) and JSON
//! output, plus the optional Gemini narrative.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::io::Write;
use std::iter;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use gar_core::{ActivityEvent, Category, EventKind, Login, ParentRef, Report, ReportEntry, Scope};
use gar_github::{GitHubClient, GitHubError, GitHubFetcher};
use serde::Serialize;

use super::util::{block_on, resolve_window};
use crate::cli::ReportArgs;
use crate::config::Config;
use crate::credentials::resolve_token;

/// Commits shown under a pull request before the rest are summarized.
const MAX_NESTED_COMMITS: usize = 5;
/// Orphan commits shown per repository.
const MAX_ORPHANS_PER_REPO: usize = 10;

pub fn run<W: Write>(writer: &mut W, args: &ReportArgs, config: &Config) -> Result<()> {
    let today = Local::now().date_naive();
    let window = resolve_window(
        args.start_date.as_deref(),
        args.end_date.as_deref(),
        args.days,
        today,
    )?;
    let scopes = resolve_scopes(&args.repos, config)?;
    let token = resolve_token(args.auth.token.as_deref())?;
    let client =
        GitHubClient::new(token, config.client_config()).context("failed to create GitHub client")?;
    let fetcher = GitHubFetcher::new(client);

    let wants_narrative = args.narrative || config.reporter.narrative;
    let model = args
        .gemini_model
        .clone()
        .unwrap_or_else(|| config.reporter.gemini_model.clone());

    let (report, narrative) = block_on(async {
        let user = resolve_user(&fetcher, args.user.as_deref(), config).await?;
        tracing::info!(%user, range = %window.search_range(), scopes = scopes.len(), "generating report");

        let report = gar_core::gather(&fetcher, &user, window, &scopes)
            .await
            .context("failed to fetch activity")?;

        let narrative = if wants_narrative {
            let rendered = format_markdown(&report, None, today)?;
            narrate(&rendered, &model).await
        } else {
            None
        };
        Ok((report, narrative))
    })?;

    tracing::debug!(
        events = report.event_count(),
        warnings = report.warnings.len(),
        dropped = ?report.dropped,
        "report classified"
    );

    if args.json {
        writeln!(
            writer,
            "{}",
            format_report_json(&report, narrative.as_deref(), Utc::now())?
        )?;
    } else {
        write!(
            writer,
            "{}",
            format_markdown(&report, narrative.as_deref(), today)?
        )?;
    }
    Ok(())
}

/// Scopes from `--repos`, else both watch lists.
fn resolve_scopes(repos: &[String], config: &Config) -> Result<Vec<Scope>> {
    let names = if repos.is_empty() {
        config.watched_scopes()
    } else {
        repos.to_vec()
    };
    if names.is_empty() {
        anyhow::bail!(
            "No repositories to report on. Pass --repos or set watch_all/watch_mentions in the config file."
        );
    }
    names
        .iter()
        .map(|name| {
            name.parse::<Scope>()
                .with_context(|| format!("invalid repository or organization: {name}"))
        })
        .collect()
}

async fn resolve_user(
    fetcher: &GitHubFetcher,
    explicit: Option<&str>,
    config: &Config,
) -> Result<Login> {
    if let Some(name) = explicit.or(config.username.as_deref()) {
        return Login::new(name).context("invalid user");
    }
    let login = fetcher
        .client()
        .authenticated_user()
        .await
        .map_err(|err| match err {
            GitHubError::Unauthorized(message) => {
                anyhow::anyhow!("authentication failed: {message}. Run 'gar login' to refresh your token.")
            }
            other => anyhow::Error::new(other).context("failed to look up the authenticated user"),
        })?;
    Ok(Login::new(login)?)
}

/// Generates the narrative, degrading to `None` with a notice on any failure.
async fn narrate(rendered: &str, model: &str) -> Option<String> {
    let client = match gar_llm::Client::from_env() {
        Ok(Some(client)) => client,
        Ok(None) => {
            eprintln!(
                "Narrative skipped: set {} to enable it.",
                gar_llm::API_KEY_VARS.join(" or ")
            );
            return None;
        }
        Err(err) => {
            eprintln!("Narrative skipped: {err}");
            return None;
        }
    };
    match client.narrate(model, rendered).await {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::warn!(error = %err, model, "narrative generation failed");
            eprintln!("Could not generate narrative: {err}");
            None
        }
    }
}

// ========== Markdown Output ==========

fn empty_message(category: Category) -> &'static str {
    match category {
        Category::AuthoredPr => "No pull requests authored during this period.",
        Category::ReviewedPr => "No pull requests reviewed during this period.",
        Category::CreatedIssue => "No issues created during this period.",
        Category::EngagedIssue => "No issue engagement during this period.",
        Category::OrphanCommit => "All commits in this period are part of pull requests.",
        Category::MaintainerAction => "No maintainer actions during this period.",
    }
}

fn short_sha(event: &ActivityEvent) -> &str {
    let sha = event
        .id
        .as_str()
        .rsplit_once('@')
        .map_or(event.id.as_str(), |(_, sha)| sha);
    &sha[..sha.len().min(7)]
}

/// Link line for a pull request or issue.
fn item_line(event: &ActivityEvent) -> String {
    let mut status: Vec<&str> = event.involvement.iter().map(|i| i.as_str()).collect();
    status.extend(event.state.as_deref());
    let mut line = format!("[{}]({}) - {}", event.id, event.url, event.title);
    if !status.is_empty() {
        let _ = write!(line, " _({})_", status.join(", "));
    }
    line
}

fn parent_line(parent: &ParentRef) -> String {
    format!("[{}]({}) - {}", parent.id, parent.url, parent.title)
}

/// One-line description of a commit or participation event.
fn detail_line(event: &ActivityEvent) -> String {
    match event.kind.known() {
        Some(EventKind::Commit) => {
            format!("[`{}`]({}) - {}", short_sha(event), event.url, event.title)
        }
        Some(EventKind::Review) => {
            let verdict = event
                .state
                .as_deref()
                .map(|s| format!(" _({s})_"))
                .unwrap_or_default();
            format!("[review]({}) by {}{verdict}", event.url, event.author)
        }
        Some(EventKind::Comment) => format!("[comment]({}) by {}", event.url, event.author),
        Some(EventKind::Triage) => format!(
            "{} by {}",
            event.action.as_deref().unwrap_or("triaged"),
            event.author
        ),
        Some(EventKind::PullRequest | EventKind::Issue) => item_line(event),
        None => format!("{} by {}", event.kind, event.author),
    }
}

fn write_details<'a>(
    out: &mut String,
    details: impl IntoIterator<Item = &'a ActivityEvent>,
) -> fmt::Result {
    let (commits, others): (Vec<_>, Vec<_>) = details
        .into_iter()
        .partition(|event| event.kind.known() == Some(EventKind::Commit));

    for commit in commits.iter().take(MAX_NESTED_COMMITS) {
        writeln!(out, "  - {}", detail_line(commit))?;
    }
    if commits.len() > MAX_NESTED_COMMITS {
        writeln!(
            out,
            "  - ... and {} more commits",
            commits.len() - MAX_NESTED_COMMITS
        )?;
    }
    for event in others {
        writeln!(out, "  - {}", detail_line(event))?;
    }
    Ok(())
}

fn write_entry(out: &mut String, entry: &ReportEntry) -> fmt::Result {
    let event = &entry.event;
    if matches!(
        event.kind.known(),
        Some(EventKind::PullRequest | EventKind::Issue)
    ) {
        writeln!(out, "- {}", item_line(event))?;
        return write_details(out, &entry.details);
    }
    match &event.parent {
        // Grouped participation: the parent heads the entry.
        Some(parent) => {
            writeln!(out, "- {}", parent_line(parent))?;
            write_details(out, iter::once(event).chain(&entry.details))
        }
        None => {
            writeln!(out, "- {}", detail_line(event))?;
            write_details(out, &entry.details)
        }
    }
}

fn write_section(out: &mut String, report: &Report, category: Category) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "### {}", category.title())?;
    let entries = report.section(category);
    if entries.is_empty() {
        return writeln!(out, "- {}", empty_message(category));
    }
    for entry in entries {
        write_entry(out, entry)?;
    }
    Ok(())
}

// ========== Closed Views ==========

/// The user's role in an item, named by the category it was filed under.
fn role(category: Category, event: &ActivityEvent) -> String {
    match category {
        Category::AuthoredPr => "authored".to_string(),
        Category::ReviewedPr => "reviewed".to_string(),
        Category::CreatedIssue => "created".to_string(),
        Category::EngagedIssue if !event.involvement.is_empty() => event
            .involvement
            .iter()
            .map(|i| i.as_str())
            .collect::<Vec<_>>()
            .join(" & "),
        Category::EngagedIssue => "engaged".to_string(),
        Category::OrphanCommit | Category::MaintainerAction => "participated".to_string(),
    }
}

/// The user's own close or merge among `events`.
fn closing_action<'a>(
    events: impl IntoIterator<Item = &'a ActivityEvent>,
    user: &Login,
) -> Option<&'a str> {
    events
        .into_iter()
        .filter(|e| e.kind.known() == Some(EventKind::Triage) && e.is_authored_by(user))
        .find_map(|e| {
            e.action
                .as_deref()
                .filter(|action| matches!(*action, "closed" | "merged"))
        })
}

fn closed_in_window(event: &ActivityEvent, report: &Report) -> bool {
    matches!(event.state.as_deref(), Some("closed" | "merged"))
        && event
            .merged_at
            .or(event.closed_at)
            .is_some_and(|at| report.window.contains(at))
}

/// Items of `kind` from `categories` that were closed or merged in the
/// window, or that the user closed or merged, each with a reason.
fn closed_items(report: &Report, kind: EventKind, categories: &[Category]) -> Vec<(String, String)> {
    let mut items = Vec::new();
    for &category in categories {
        for entry in report.section(category) {
            let event = &entry.event;
            if event.kind.known() == Some(kind) {
                let acted = closing_action(&entry.details, &report.user);
                if acted.is_none() && !closed_in_window(event, report) {
                    continue;
                }
                let state = acted.or(event.state.as_deref()).unwrap_or("closed");
                let by = if acted.is_some() { " by you" } else { "" };
                items.push((
                    format!("[{}]({}) - {}", event.id, event.url, event.title),
                    format!("{state}{by} ({})", role(category, event)),
                ));
            } else if let Some(parent) = event.parent.as_ref().filter(|p| p.kind == kind) {
                let members = iter::once(event).chain(&entry.details);
                if let Some(action) = closing_action(members, &report.user) {
                    items.push((parent_line(parent), format!("{action} by you")));
                }
            }
        }
    }
    items
}

fn write_closed(out: &mut String, title: &str, empty: &str, items: &[(String, String)]) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "### {title}")?;
    if items.is_empty() {
        return writeln!(out, "- {empty}");
    }
    for (line, reason) in items {
        writeln!(out, "- {line} _{reason}_")?;
    }
    Ok(())
}

/// Orphan commits, grouped by repository.
fn write_work_in_progress(out: &mut String, report: &Report) -> fmt::Result {
    let category = Category::OrphanCommit;
    writeln!(out)?;
    writeln!(out, "### {}", category.title())?;
    writeln!(out, "_Commits not yet part of a pull request_")?;

    let entries = report.section(category);
    if entries.is_empty() {
        return writeln!(out, "- {}", empty_message(category));
    }

    let mut by_repo: BTreeMap<&str, Vec<&ActivityEvent>> = BTreeMap::new();
    for entry in entries {
        by_repo
            .entry(entry.event.repo.as_str())
            .or_default()
            .extend(iter::once(&entry.event).chain(&entry.details));
    }
    for (repo, commits) in by_repo {
        writeln!(out)?;
        writeln!(out, "#### `{repo}`")?;
        for commit in commits.iter().take(MAX_ORPHANS_PER_REPO) {
            writeln!(out, "- {}", detail_line(commit))?;
        }
        if commits.len() > MAX_ORPHANS_PER_REPO {
            writeln!(
                out,
                "- ... and {} more commits",
                commits.len() - MAX_ORPHANS_PER_REPO
            )?;
        }
    }
    Ok(())
}

/// Formats the Markdown report.
pub fn format_markdown(
    report: &Report,
    narrative: Option<&str>,
    generated_on: NaiveDate,
) -> Result<String, fmt::Error> {
    let mut out = String::new();

    // Header
    writeln!(out, "# GitHub Activity Report for {}", report.user)?;
    writeln!(
        out,
        "**Period:** `{}` to `{}`",
        report.window.start_date(),
        report.window.end_date()
    )?;
    let scopes: Vec<String> = report.scopes.iter().map(ToString::to_string).collect();
    writeln!(out, "**Scopes:** {}", scopes.join(", "))?;

    writeln!(out)?;
    writeln!(out, "## Contributions")?;
    writeln!(out, "_Pull requests, issues, and commits authored by you_")?;
    write_section(&mut out, report, Category::AuthoredPr)?;
    write_section(&mut out, report, Category::CreatedIssue)?;
    write_work_in_progress(&mut out, report)?;

    writeln!(out)?;
    writeln!(out, "## Maintainer Work")?;
    writeln!(out, "_Code reviews, issue triage, and community engagement_")?;
    write_section(&mut out, report, Category::ReviewedPr)?;
    write_closed(
        &mut out,
        "Pull Requests Closed/Merged",
        "No pull requests closed or merged during this period.",
        &closed_items(
            report,
            EventKind::PullRequest,
            &[Category::AuthoredPr, Category::ReviewedPr, Category::MaintainerAction],
        ),
    )?;
    write_section(&mut out, report, Category::EngagedIssue)?;
    write_closed(
        &mut out,
        "Issues Closed",
        "No issues closed during this period.",
        &closed_items(
            report,
            EventKind::Issue,
            &[Category::CreatedIssue, Category::EngagedIssue, Category::MaintainerAction],
        ),
    )?;
    write_section(&mut out, report, Category::MaintainerAction)?;

    if !report.warnings.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Warnings")?;
        for warning in &report.warnings {
            writeln!(out, "- {warning}")?;
        }
    }

    if let Some(text) = narrative {
        writeln!(out)?;
        writeln!(out, "## Narrative Summary")?;
        writeln!(out)?;
        writeln!(out, "{}", text.trim_end())?;
    }

    writeln!(out)?;
    writeln!(out, "---")?;
    writeln!(out, "_Report generated on {generated_on}_")?;
    Ok(out)
}

// ========== JSON Output ==========

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    #[serde(flatten)]
    report: &'a Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    narrative: Option<&'a str>,
}

/// Formats the report as JSON.
pub fn format_report_json(
    report: &Report,
    narrative: Option<&str>,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    let json = JsonReport {
        generated_at: generated_at.to_rfc3339(),
        report,
        narrative,
    };
    Ok(serde_json::to_string_pretty(&json)?)
}
