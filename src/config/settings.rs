//! Settings configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum number of concurrently live sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Per-session scrollback retention in bytes
    #[serde(default = "default_scrollback_bytes")]
    pub scrollback_bytes: usize,

    /// Seconds of silence before a session is flagged as awaiting input.
    /// Set to 0 to disable idle detection.
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,

    /// Shell to run when a session is spawned without a command.
    /// Defaults to the platform's default program.
    #[serde(default)]
    pub shell: Option<String>,

    /// Directory scanned for plugin manifests
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
}

/// Per-repository overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Keyboard-remap overrides: key name to the byte sequence written
    /// instead of the default encoding (e.g. "shift+enter" = "\\\r")
    #[serde(default)]
    pub keyboard: HashMap<String, String>,
}

fn default_max_sessions() -> usize {
    12
}

fn default_scrollback_bytes() -> usize {
    256 * 1024
}

fn default_idle_threshold_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            scrollback_bytes: default_scrollback_bytes(),
            idle_threshold_secs: default_idle_threshold_secs(),
            shell: None,
            plugin_dir: None,
        }
    }
}
