//! PTY session management.
//!
//! This module owns the lifecycle of concurrently running pseudo-terminal
//! sessions: spawning, I/O, resize, pause/resume, and teardown. Each live
//! session has exactly one dedicated reader thread ([`reader`]) that pumps
//! the child's output through the ring buffer, the renderer broadcast, and
//! the line-reassembly/parse pipeline.

pub mod ansi;
pub mod keyboard;
pub mod line_buffer;
mod orchestrator;
mod process;
mod reader;
mod registry;
mod ring;
mod session;

pub use orchestrator::{
    CloseMode, OrchestratorConfig, SessionOrchestrator, SettingsProvider, WorkspaceProvisioner,
    WorkspaceRequest,
};
pub use registry::SessionRegistry;
pub use ring::OutputRing;
pub use session::{SessionEvent, SessionHandle};

use crate::domain::SessionId;
use std::path::PathBuf;

/// Typed failures of the session control plane.
///
/// `SessionNotFound` is a normal outcome, not an exceptional one: sessions
/// close asynchronously (process exit) between a UI action being queued and
/// executed, so callers are expected to handle it quietly.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session capacity exceeded ({active}/{max})")]
    CapacityExceeded { active: usize, max: usize },

    #[error("failed to spawn session after {attempts} attempt(s): {source}")]
    SpawnFailed {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Spawn failed after the workspace collaborator already provisioned a
    /// directory. The path is carried so the caller can roll it back.
    #[error("spawn failed in provisioned workspace {}: {source}", workspace.display())]
    WorkspaceSpawn {
        workspace: PathBuf,
        #[source]
        source: Box<SessionError>,
    },

    #[error("i/o error on session {id}: {source}")]
    Io {
        id: SessionId,
        #[source]
        source: std::io::Error,
    },
}
