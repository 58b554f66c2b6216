//! Shared test utilities for session integration tests

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use termdock::plugin::PluginRegistry;
use termdock::terminal::{OrchestratorConfig, SessionEvent, SessionOrchestrator};
use termdock::SessionConfig;

/// Orchestrator with a small cap and idle detection disabled, so tests
/// only see the events their sessions produce.
pub fn test_orchestrator(max_sessions: usize) -> (Arc<SessionOrchestrator>, Arc<PluginRegistry>) {
    let plugins = Arc::new(PluginRegistry::new());
    let config = OrchestratorConfig {
        max_sessions,
        ring_capacity: 64 * 1024,
        idle_threshold: Duration::ZERO,
        shell: None,
    };
    let orchestrator = Arc::new(SessionOrchestrator::new(config, Arc::clone(&plugins)));
    (orchestrator, plugins)
}

/// Session config running a shell script in the current directory.
pub fn sh(script: &str) -> SessionConfig {
    SessionConfig::new(
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    )
}

/// Drain a session's event stream until the exit notification (inclusive),
/// with a generous timeout so slow CI machines do not flake.
pub async fn collect_until_exit(
    rx: &mut broadcast::Receiver<SessionEvent>,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let deadline = Duration::from_secs(15);
    loop {
        match timeout(deadline, rx.recv()).await {
            Ok(Ok(event)) => {
                let is_exit = matches!(event, SessionEvent::Exit(_));
                events.push(event);
                if is_exit {
                    break;
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            Err(_) => panic!("timed out waiting for session exit; got {} events", events.len()),
        }
    }
    events
}

/// All raw output bytes in a collected event sequence.
pub fn collected_output(events: &[SessionEvent]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for event in events {
        if let SessionEvent::Data(chunk) = event {
            bytes.extend_from_slice(chunk);
        }
    }
    bytes
}
