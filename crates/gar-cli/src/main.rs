use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gar_cli::commands::{auth, inbox, report};
use gar_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr; stdout carries only command output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Report(args)) => report::run(&mut stdout, args, &config)?,
        Some(Commands::Inbox {
            since,
            no_update,
            auth,
        }) => inbox::run(
            &mut stdout,
            since.as_deref(),
            *no_update,
            auth.token.as_deref(),
            &config,
        )?,
        Some(Commands::Login { client_id, force }) => {
            auth::login(&mut stdout, client_id.as_deref(), *force)?;
        }
        Some(Commands::Logout) => auth::logout(&mut stdout)?,
        Some(Commands::AuthStatus) => auth::auth_status(&mut stdout)?,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
