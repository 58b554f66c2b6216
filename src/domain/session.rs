//! Session identity and configuration types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Opaque identifier for a PTY session.
///
/// Assigned at spawn time and never reused; the registry is keyed by it and
/// every event emitted for a session carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh session id.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().to_string();
        Self(format!("term-{}", &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Configuration for spawning a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Command and arguments to run. Empty means "use the configured shell".
    #[serde(default)]
    pub command: Vec<String>,

    /// Working directory for the child process.
    pub cwd: PathBuf,

    /// Initial terminal size.
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,

    /// Environment overrides applied on top of the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Optional logical tab/workspace this session belongs to.
    #[serde(default)]
    pub tab: Option<String>,
}

fn default_rows() -> u16 {
    30
}

fn default_cols() -> u16 {
    120
}

impl SessionConfig {
    /// Create a config for a command in a working directory, with defaults
    /// for everything else.
    pub fn new(command: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command,
            cwd: cwd.into(),
            rows: default_rows(),
            cols: default_cols(),
            env: HashMap::new(),
            tab: None,
        }
    }
}

/// Snapshot of a session's public state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub command: Vec<String>,
    pub cwd: PathBuf,
    pub rows: u16,
    pub cols: u16,
    pub alive: bool,
    pub paused: bool,
    pub created_at: DateTime<Utc>,
    pub tab: Option<String>,
}

/// Orchestrator-level counters exposed to the UI.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub max_sessions: usize,
}

/// Best-effort description of the process holding the terminal's foreground
/// process group.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Process name, when the platform exposes it.
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("term-"));
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::new(vec!["claude".into()], "/tmp");
        assert_eq!(config.rows, 30);
        assert_eq!(config.cols, 120);
        assert!(config.env.is_empty());
    }
}
