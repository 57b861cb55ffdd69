//! Binary-level tests for the `gar` CLI.
//!
//! These cover the paths that fail or finish before any network call, with
//! `HOME` pointed at a temp directory so no real config or token leaks in.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn gar_binary() -> String {
    env!("CARGO_BIN_EXE_gar").to_string()
}

fn gar(home: &Path, args: &[&str]) -> Output {
    Command::new(gar_binary())
        .env("HOME", home)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("XDG_STATE_HOME")
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_OAUTH_CLIENT_ID")
        .env_remove("GEMINI_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .env_remove("GAR_USERNAME")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run gar")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_lists_subcommands() {
    let temp = TempDir::new().unwrap();
    let output = gar(temp.path(), &["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    for command in ["report", "inbox", "login", "logout", "auth-status"] {
        assert!(help.contains(command), "help should mention {command}:\n{help}");
    }
}

#[test]
fn test_report_without_token_suggests_login() {
    let temp = TempDir::new().unwrap();
    let output = gar(temp.path(), &["report", "--repos", "octo/widgets"]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("gar login"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn test_report_without_scopes_fails() {
    let temp = TempDir::new().unwrap();
    let output = gar(temp.path(), &["report", "--token", "ghp_test"]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("No repositories to report on"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn test_report_rejects_inverted_dates() {
    let temp = TempDir::new().unwrap();
    let output = gar(
        temp.path(),
        &[
            "report",
            "--repos",
            "octo/widgets",
            "--start-date",
            "2024-01-08",
            "--end-date",
            "2024-01-01",
        ],
    );
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("start date 2024-01-08 is after end date 2024-01-01"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn test_report_rejects_unparseable_date() {
    let temp = TempDir::new().unwrap();
    let output = gar(
        temp.path(),
        &["report", "--repos", "octo/widgets", "--start-date", "someday"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid --start-date"));
}

#[test]
fn test_malformed_config_file_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("gar.toml");
    std::fs::write(&config, "watch_all = 3").unwrap();

    let output = gar(
        temp.path(),
        &["--config", config.to_str().unwrap(), "auth-status"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to load configuration"));
}

#[test]
fn test_auth_status_and_logout_without_token() {
    let temp = TempDir::new().unwrap();

    let status = gar(temp.path(), &["auth-status"]);
    assert!(status.status.success(), "stderr: {}", stderr(&status));
    assert!(stdout(&status).contains("Not logged in"));

    let logout = gar(temp.path(), &["logout"]);
    assert!(logout.status.success(), "stderr: {}", stderr(&logout));
    assert!(stdout(&logout).contains("No saved token"));
}

// Token path follows the XDG layout.
#[cfg(target_os = "linux")]
#[test]
fn test_logout_deletes_saved_token() {
    let temp = TempDir::new().unwrap();
    let token_dir = temp.path().join(".config/gar");
    std::fs::create_dir_all(&token_dir).unwrap();
    std::fs::write(
        token_dir.join("oauth_token.json"),
        r#"{"access_token":"gho_saved","created_at":"2024-01-08T09:00:00Z"}"#,
    )
    .unwrap();

    let status = gar(temp.path(), &["auth-status"]);
    assert!(stdout(&status).contains("Logged in: token saved 2024-01-08 09:00 UTC"));

    let logout = gar(temp.path(), &["logout"]);
    assert!(logout.status.success());
    assert!(stdout(&logout).contains("https://github.com/settings/tokens"));
    assert!(!token_dir.join("oauth_token.json").exists());
}

// Token path follows the XDG layout.
#[cfg(target_os = "linux")]
#[test]
fn test_login_keeps_existing_token_without_force() {
    let temp = TempDir::new().unwrap();
    let token_dir = temp.path().join(".config/gar");
    std::fs::create_dir_all(&token_dir).unwrap();
    std::fs::write(
        token_dir.join("oauth_token.json"),
        r#"{"access_token":"gho_saved","created_at":"2024-01-08T09:00:00Z"}"#,
    )
    .unwrap();

    let output = gar(temp.path(), &["login"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Already logged in"));
}
