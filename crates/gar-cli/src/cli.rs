//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// GitHub activity reporter.
///
/// Summarizes what a user did on GitHub over a date range: pull requests
/// authored and reviewed, issues, commits not yet in a pull request, and
/// maintainer actions.
#[derive(Debug, Parser)]
#[command(name = "gar", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate an activity report.
    Report(ReportArgs),

    /// Show new notifications and watched activity since the last run.
    Inbox {
        /// Look back to this time instead of the last run
        /// (RFC 3339 or relative, e.g. '2 days ago').
        #[arg(long)]
        since: Option<String>,

        /// Do not record this run as the last run.
        #[arg(long)]
        no_update: bool,

        #[command(flatten)]
        auth: TokenArgs,
    },

    /// Log in with the GitHub OAuth device flow.
    Login {
        /// OAuth app client ID.
        #[arg(long, env = "GITHUB_OAUTH_CLIENT_ID")]
        client_id: Option<String>,

        /// Log in again even if a token is saved.
        #[arg(long)]
        force: bool,
    },

    /// Delete the saved OAuth token.
    Logout,

    /// Show whether a saved OAuth token exists.
    AuthStatus,
}

#[derive(Debug, Args)]
pub struct TokenArgs {
    /// GitHub token; defaults to the saved login.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// First day of the report (YYYY-MM-DD, 'today', 'yesterday', 'N days ago').
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last day of the report, inclusive. Defaults to today.
    #[arg(long)]
    pub end_date: Option<String>,

    /// Days to look back when no start date is given.
    #[arg(long, default_value_t = 1)]
    pub days: u32,

    /// Repositories (owner/name) or organizations to report on.
    /// Defaults to the watch lists in the config file.
    #[arg(long, num_args = 1..)]
    pub repos: Vec<String>,

    /// Report on this user instead of the token's owner.
    #[arg(long)]
    pub user: Option<String>,

    /// Append a narrative summary generated by Gemini.
    #[arg(long)]
    pub narrative: bool,

    /// Gemini model for the narrative.
    #[arg(long)]
    pub gemini_model: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub auth: TokenArgs,
}
