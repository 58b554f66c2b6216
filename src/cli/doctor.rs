//! Doctor command implementation

use anyhow::Result;
use std::path::{Path, PathBuf};

use termdock::config::Config;
use termdock::plugin::PluginManifest;

/// Agent CLIs termdock knows how to extract signals from.
const KNOWN_AGENTS: &[&str] = &["claude", "codex", "gemini", "cursor-agent"];

/// Report which agent CLIs are installed and what config is active.
pub fn doctor_command(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => Config::default_path(),
    };

    println!("termdock doctor");
    println!();

    if path.exists() {
        println!("config: {}", path.display());
    } else {
        println!(
            "config: {} (not found, using defaults - run `termdock init`)",
            path.display()
        );
    }

    let config = Config::load(config_path)?;
    println!("  max_sessions        = {}", config.settings.max_sessions);
    println!("  scrollback_bytes    = {}", config.settings.scrollback_bytes);
    println!(
        "  idle_threshold_secs = {}",
        config.settings.idle_threshold_secs
    );
    match &config.settings.shell {
        Some(shell) => println!("  shell               = {}", shell),
        None => println!("  shell               = (platform default)"),
    }
    if !config.repo.is_empty() {
        println!("  repo overrides      = {}", config.repo.len());
    }
    println!();

    println!("agent CLIs:");
    for agent in KNOWN_AGENTS {
        match find_in_path(agent) {
            Some(path) => println!("  {:<14} {}", agent, path.display()),
            None => println!("  {:<14} not found", agent),
        }
    }

    if let Some(dir) = &config.settings.plugin_dir {
        println!();
        println!("plugins in {}:", dir.display());
        match std::fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten().filter(|e| e.path().is_dir()) {
                    match PluginManifest::from_dir(&entry.path()) {
                        Ok(m) => println!("  {:<14} v{} ({})", m.id, m.version, m.name),
                        Err(e) => println!(
                            "  {:<14} invalid manifest: {}",
                            entry.file_name().to_string_lossy(),
                            e
                        ),
                    }
                }
            }
            Err(e) => println!("  (unreadable: {})", e),
        }
    }

    Ok(())
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
