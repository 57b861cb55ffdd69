//! Saved OAuth token and token resolution.
//!
//! The token from `gar login` is stored in `oauth_token.json` in the config
//! directory, readable only by the owner.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token saved by `gar login`.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("access_token", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Returns the path to oauth_token.json in the config directory.
pub fn token_path() -> Result<PathBuf> {
    let config_dir =
        crate::config::dirs_config_path().context("could not determine config directory")?;
    Ok(config_dir.join("oauth_token.json"))
}

/// Loads the saved token.
///
/// Returns `None` if the file doesn't exist.
/// Returns an error if the file exists but is unreadable/unparseable.
pub fn load_token() -> Result<Option<StoredToken>> {
    load_from(&token_path()?)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<StoredToken>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let token: StoredToken =
                serde_json::from_str(&content).context("failed to parse oauth_token.json")?;
            Ok(Some(token))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("failed to read oauth_token.json"),
    }
}

/// Saves a freshly issued token.
pub fn save_token(access_token: &str) -> Result<StoredToken> {
    let token = StoredToken {
        access_token: access_token.to_string(),
        created_at: Utc::now(),
    };
    save_to(&token_path()?, &token)?;
    Ok(token)
}

pub(crate) fn save_to(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    let json = serde_json::to_string_pretty(token).context("failed to serialize token")?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .context("failed to open oauth_token.json")?;
    // An existing file keeps its old mode through open(); tighten it.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .context("failed to restrict oauth_token.json permissions")?;
    }
    file.write_all(json.as_bytes())
        .context("failed to write oauth_token.json")?;
    Ok(())
}

/// Deletes the saved token. Returns whether one existed.
pub fn clear_token() -> Result<bool> {
    clear_at(&token_path()?)
}

pub(crate) fn clear_at(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context("failed to delete oauth_token.json"),
    }
}

/// Picks the token for API calls: explicit (flag or `GITHUB_TOKEN`) first,
/// then the saved login.
pub fn resolve_token(explicit: Option<&str>) -> Result<String> {
    resolve_with(explicit, load_token)
}

fn resolve_with(
    explicit: Option<&str>,
    saved: impl FnOnce() -> Result<Option<StoredToken>>,
) -> Result<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        tracing::debug!("using explicit token");
        return Ok(token.to_string());
    }
    match saved()? {
        Some(stored) => {
            tracing::debug!(created_at = %stored.created_at, "using saved OAuth token");
            Ok(stored.access_token)
        }
        None => anyhow::bail!(
            "No GitHub token found. Run 'gar login', pass --token, or set GITHUB_TOKEN."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/oauth_token.json");
        let token = StoredToken {
            access_token: "gho_abc".into(),
            created_at: Utc::now(),
        };

        save_to(&path, &token).unwrap();
        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.access_token, "gho_abc");
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_token.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let token = StoredToken {
            access_token: "gho_abc".into(),
            created_at: Utc::now(),
        };
        save_to(&path, &token).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_token.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_token.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(clear_at(&path).unwrap());
        assert!(!clear_at(&path).unwrap());
    }

    #[test]
    fn test_explicit_token_wins() {
        let token = resolve_with(Some("ghp_flag"), || panic!("saved token not needed")).unwrap();
        assert_eq!(token, "ghp_flag");
    }

    #[test]
    fn test_blank_explicit_falls_back_to_saved() {
        let token = resolve_with(Some("  "), || {
            Ok(Some(StoredToken {
                access_token: "gho_saved".into(),
                created_at: Utc::now(),
            }))
        })
        .unwrap();
        assert_eq!(token, "gho_saved");
    }

    #[test]
    fn test_no_token_suggests_login() {
        let err = resolve_with(None, || Ok(None)).unwrap_err();
        assert!(err.to_string().contains("gar login"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = StoredToken {
            access_token: "gho_secret".into(),
            created_at: Utc::now(),
        };
        assert!(!format!("{token:?}").contains("gho_secret"));
    }
}
