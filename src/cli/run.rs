//! Run command implementation (headless session driver)

use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::debug;

use termdock::config::Config;
use termdock::plugin::{PluginRegistry, PtySink};
use termdock::terminal::{CloseMode, SessionEvent, SessionOrchestrator};
use termdock::SessionConfig;

/// Spawn one session and stream it to stdout until the child exits.
/// `--events` switches the output from raw bytes to JSON-encoded
/// structured events, one per line.
pub async fn run_command(
    config_path: Option<&Path>,
    command: Vec<String>,
    cwd: Option<PathBuf>,
    events: bool,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let cwd = match cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let plugins = Arc::new(PluginRegistry::new());
    let orchestrator = Arc::new(SessionOrchestrator::with_settings(
        config.orchestrator_config(),
        Arc::clone(&plugins),
        Some(Arc::new(config)),
    ));
    let sink: Weak<dyn PtySink> = Arc::downgrade(&(orchestrator.clone() as Arc<dyn PtySink>));
    plugins.set_pty_sink(sink);

    let session_id = orchestrator.spawn(SessionConfig::new(command, cwd))?;
    let mut rx = orchestrator.subscribe(&session_id)?;

    let exit_code = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(SessionEvent::Data(bytes)) if !events => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
                Ok(SessionEvent::Parsed(event)) if events => {
                    println!("{}", serde_json::to_string(&event)?);
                }
                Ok(SessionEvent::Exit(code)) => break code,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "renderer subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break 0,
            },
            _ = tokio::signal::ctrl_c() => {
                debug!(session_id = %session_id, "interrupt received; closing session");
                orchestrator.close(&session_id, CloseMode::Graceful)?;
            }
        }
    };

    orchestrator.shutdown();
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
