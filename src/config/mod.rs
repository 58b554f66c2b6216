//! Configuration loading and management

mod settings;

pub use settings::{RepoSettings, Settings};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::terminal::{OrchestratorConfig, SettingsProvider};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,

    /// Per-repository overrides, keyed by absolute repository path.
    #[serde(default)]
    pub repo: HashMap<String, RepoSettings>,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the config from an explicit path or the default location.
    /// A missing file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(),
        };
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// `~/.termdock/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".termdock")
            .join("config.toml")
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_sessions: self.settings.max_sessions,
            ring_capacity: self.settings.scrollback_bytes,
            idle_threshold: std::time::Duration::from_secs(self.settings.idle_threshold_secs),
            shell: self.settings.shell.clone(),
        }
    }
}

impl SettingsProvider for Config {
    /// Keyboard remaps for the repository containing `cwd`. The longest
    /// configured path prefix wins, so a nested repo overrides its parent.
    fn keyboard_remaps(&self, cwd: &Path) -> HashMap<String, String> {
        self.repo
            .iter()
            .filter(|(repo_path, _)| cwd.starts_with(repo_path))
            .max_by_key(|(repo_path, _)| repo_path.len())
            .map(|(_, repo)| repo.keyboard.clone())
            .unwrap_or_default()
    }
}
