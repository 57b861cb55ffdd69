//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use gar_github::{ClientConfig, DEFAULT_API_URL, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Login to report on. Resolved from the token when unset.
    pub username: Option<String>,
    /// Scopes watched in full: reported on, and every update shows in the inbox.
    pub watch_all: Vec<String>,
    /// Scopes where only mentions of the user show in the inbox.
    pub watch_mentions: Vec<String>,
    pub reporter: ReporterConfig,
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Generate a narrative without `--narrative`.
    pub narrative: bool,
    pub gemini_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    /// Attempts per request, the first one included.
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: None,
            watch_all: Vec::new(),
            watch_mentions: Vec::new(),
            reporter: ReporterConfig {
                narrative: false,
                gemini_model: gar_llm::DEFAULT_MODEL.to_string(),
            },
            github: GitHubConfig {
                api_url: DEFAULT_API_URL.to_string(),
                timeout_secs: 30,
                max_attempts: 3,
            },
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // GAR_USERNAME, GAR_GITHUB__API_URL, ...
        figment = figment.merge(Env::prefixed("GAR_").split("__"));

        figment.extract()
    }

    /// Both watch lists, full watches first, without repeats.
    pub fn watched_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        for scope in self.watch_all.iter().chain(&self.watch_mentions) {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
        scopes
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.github.api_url.clone(),
            timeout: Duration::from_secs(self.github.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.github.max_attempts.max(1),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Returns the platform-specific config directory for gar.
///
/// On Linux: `~/.config/gar`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gar"))
}

/// Returns the platform-specific state directory for gar.
///
/// On Linux: `~/.local/state/gar`
pub fn dirs_state_path() -> Option<PathBuf> {
    dirs::state_dir().map(|p| p.join("gar"))
}
