//! Login, logout and auth-status commands.

use std::io::Write;

use anyhow::{Context, Result};
use gar_github::{DEFAULT_CLIENT_ID, DeviceFlow};

use super::util::block_on;
use crate::credentials::{clear_token, load_token, save_token, token_path};

const TOKEN_SETTINGS_URL: &str = "https://github.com/settings/tokens";

/// Runs the OAuth device flow and saves the granted token.
pub fn login<W: Write>(writer: &mut W, client_id: Option<&str>, force: bool) -> Result<()> {
    if !force {
        if let Some(existing) = load_token()? {
            writeln!(
                writer,
                "Already logged in (token saved {}). Use --force to log in again.",
                existing.created_at.format("%Y-%m-%d")
            )?;
            return Ok(());
        }
    }

    let client_id = client_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_CLIENT_ID);
    let flow = DeviceFlow::new(client_id).context("failed to start device flow")?;

    let token = block_on(async {
        let code = flow
            .request_code()
            .await
            .context("failed to request a device code")?;
        writeln!(writer, "Open {} and enter code: {}", code.verification_uri, code.user_code)?;
        writer.flush()?;
        tracing::debug!(expires_in = code.expires_in, interval = code.interval, "waiting for authorization");
        flow.wait_for_token(&code)
            .await
            .context("authorization did not complete")
    })?;

    save_token(&token)?;
    writeln!(writer, "Logged in. Token saved to {}", token_path()?.display())?;
    Ok(())
}

pub fn logout<W: Write>(writer: &mut W) -> Result<()> {
    if clear_token()? {
        writeln!(writer, "Saved token deleted.")?;
        writeln!(
            writer,
            "To revoke it on GitHub as well, visit {TOKEN_SETTINGS_URL}"
        )?;
    } else {
        writeln!(writer, "No saved token.")?;
    }
    Ok(())
}

pub fn auth_status<W: Write>(writer: &mut W) -> Result<()> {
    match load_token()? {
        Some(token) => writeln!(
            writer,
            "Logged in: token saved {} at {}",
            token.created_at.format("%Y-%m-%d %H:%M UTC"),
            token_path()?.display()
        )?,
        None => writeln!(writer, "Not logged in. Run 'gar login' to authenticate.")?,
    }
    if std::env::var_os("GITHUB_TOKEN").is_some() {
        writeln!(writer, "GITHUB_TOKEN is set and takes precedence over the saved token.")?;
    }
    Ok(())
}
