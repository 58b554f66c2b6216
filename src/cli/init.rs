//! Init command implementation

use anyhow::{bail, Result};
use std::path::Path;

use termdock::config::Config;

/// Default configuration content for termdock init
pub const DEFAULT_CONFIG: &str = r#"# TermDock Configuration
# ======================
#
# TermDock runs AI coding agents (claude, codex, gemini, cursor-agent)
# in managed terminal sessions and extracts structured signals from
# their output.

# ============================================================================
# SETTINGS - Global configuration options
# ============================================================================
#
# Available options:
#   max_sessions        - Maximum concurrently live sessions (default: 12)
#   scrollback_bytes    - Per-session scrollback retention in bytes (default: 262144)
#   idle_threshold_secs - Seconds of silence before a session is flagged as
#                         awaiting input; 0 disables (default: 30)
#   shell               - Shell for sessions spawned without a command
#                         (default: the platform's default shell)
#   plugin_dir          - Directory scanned for plugin manifests

[settings]
max_sessions = 12
scrollback_bytes = 262144
idle_threshold_secs = 30
# shell = "/bin/zsh"
# plugin_dir = "~/.termdock/plugins"

# ============================================================================
# REPOSITORIES - Per-repository overrides
# ============================================================================
#
# Keyboard remaps change how named keys are encoded when written into
# sessions rooted at the given repository path. Useful for agents that
# expect a non-standard newline-in-prompt sequence.
#
# [repo."/home/me/projects/widget".keyboard]
# "shift+enter" = "\\\r"
"#;

pub fn init_command(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => Config::default_path(),
    };

    if path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, DEFAULT_CONFIG)?;

    println!("Created config file: {}", path.display());
    Ok(())
}
