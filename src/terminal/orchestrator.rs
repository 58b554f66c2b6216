//! The session control plane.
//!
//! [`SessionOrchestrator`] is the front door for everything outside the
//! reader threads: spawn, write, resize, pause/resume, close, introspection.
//! It enforces the session cap through the registry's slot reservation,
//! retries transient spawn failures with bounded backoff, and owns the idle
//! sweeper that turns prolonged silence into an awaiting-input signal.

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::{
    AwaitingKind, EventKind, ParsedEvent, ProcessInfo, SessionConfig, SessionId, SessionInfo,
    SessionStats,
};
use crate::plugin::{PluginRegistry, PtySink};

use super::keyboard;
use super::reader;
use super::registry::SessionRegistry;
use super::session::{SessionEvent, SessionHandle};
use super::SessionError;

/// Spawn attempts before `SpawnFailed` is surfaced. Attempt `n` failing
/// sleeps `n * 100ms` before the next try.
const SPAWN_ATTEMPTS: u32 = 3;

/// How long a graceful close waits for the child to exit after SIGTERM
/// before escalating to a hard kill.
const GRACE_PERIOD: Duration = Duration::from_millis(1500);

/// Idle sweeper wake interval.
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// How the child process is brought down on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// SIGTERM first, hard kill after [`GRACE_PERIOD`].
    Graceful,
    /// Hard kill immediately.
    Force,
}

/// Per-repository settings consulted at spawn time.
pub trait SettingsProvider: Send + Sync {
    /// Keyboard-remap overrides for sessions rooted at `cwd`. Keys are key
    /// names ("shift+enter"), values the byte sequence to write instead of
    /// the default encoding.
    fn keyboard_remaps(&self, cwd: &Path) -> HashMap<String, String>;
}

/// Provisions an isolated workspace (e.g. a git worktree) for
/// [`SessionOrchestrator::spawn_in_workspace`].
pub trait WorkspaceProvisioner: Send + Sync {
    fn provision(&self, base: &Path, branch_name: &str) -> anyhow::Result<PathBuf>;
}

/// Request for an isolated workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceRequest {
    /// Repository (or any path inside it) to branch from.
    pub base: PathBuf,
    /// Requested branch name; the provisioner may suffix it on collision.
    pub branch_name: String,
}

/// Tunables the config layer feeds into the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_sessions: usize,
    /// Per-session scrollback ring capacity in bytes.
    pub ring_capacity: usize,
    /// Silence window before the implicit awaiting-input signal fires.
    /// Zero disables the idle sweeper.
    pub idle_threshold: Duration,
    /// Shell to run when a spawn config has no command. Falls back to the
    /// platform default program.
    pub shell: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_sessions: 12,
            ring_capacity: 256 * 1024,
            idle_threshold: Duration::from_secs(30),
            shell: None,
        }
    }
}

pub struct SessionOrchestrator {
    registry: Arc<SessionRegistry>,
    plugins: Arc<PluginRegistry>,
    config: OrchestratorConfig,
    settings: Option<Arc<dyn SettingsProvider>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl SessionOrchestrator {
    pub fn new(config: OrchestratorConfig, plugins: Arc<PluginRegistry>) -> Self {
        Self::with_settings(config, plugins, None)
    }

    pub fn with_settings(
        config: OrchestratorConfig,
        plugins: Arc<PluginRegistry>,
        settings: Option<Arc<dyn SettingsProvider>>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.max_sessions));
        let shutdown = Arc::new(AtomicBool::new(false));

        let sweeper = if config.idle_threshold.is_zero() {
            None
        } else {
            Some(spawn_idle_sweeper(
                Arc::clone(&registry),
                Arc::clone(&plugins),
                config.idle_threshold,
                Arc::clone(&shutdown),
            ))
        };

        Self {
            registry,
            plugins,
            config,
            settings,
            sweeper: Mutex::new(sweeper),
            shutdown,
        }
    }

    // ========== Spawn ==========

    /// Spawn a new PTY session.
    ///
    /// The capacity slot is reserved before the child is created, so
    /// concurrent spawns can never exceed the cap; a failed spawn releases
    /// it. OS-level failures are retried [`SPAWN_ATTEMPTS`] times with
    /// increasing backoff before `SpawnFailed` is surfaced.
    pub fn spawn(&self, config: SessionConfig) -> Result<SessionId, SessionError> {
        let slot = self.registry.reserve()?;

        let mut last_err = None;
        for attempt in 1..=SPAWN_ATTEMPTS {
            match self.try_spawn(&config) {
                Ok(spawned) => {
                    let id = spawned.handle.id.clone();
                    self.registry.insert(Arc::clone(&spawned.handle), slot);
                    let thread = reader::spawn(
                        Arc::clone(&spawned.handle),
                        spawned.output,
                        Arc::clone(&self.registry),
                        Arc::clone(&self.plugins),
                    );
                    spawned.handle.set_reader_thread(thread);
                    info!(session_id = %id, cwd = %config.cwd.display(), "session spawned");
                    return Ok(id);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "spawn attempt failed");
                    last_err = Some(e);
                    if attempt < SPAWN_ATTEMPTS {
                        std::thread::sleep(Duration::from_millis(100 * attempt as u64));
                    }
                }
            }
        }

        Err(SessionError::SpawnFailed {
            attempts: SPAWN_ATTEMPTS,
            source: last_err.expect("at least one attempt ran"),
        })
    }

    /// Provision an isolated workspace, then spawn the session inside it.
    ///
    /// Provisioning failures surface as-is. A spawn failure after successful
    /// provisioning is wrapped in `WorkspaceSpawn` carrying the provisioned
    /// path, so the caller can roll the workspace back - the orchestrator
    /// never removes it silently.
    pub fn spawn_in_workspace(
        &self,
        mut config: SessionConfig,
        request: &WorkspaceRequest,
        provisioner: &dyn WorkspaceProvisioner,
    ) -> Result<SessionId, SessionError> {
        let workspace = provisioner
            .provision(&request.base, &request.branch_name)
            .map_err(|source| SessionError::SpawnFailed {
                attempts: 0,
                source,
            })?;
        info!(workspace = %workspace.display(), branch = %request.branch_name, "workspace provisioned");

        config.cwd = workspace.clone();
        self.spawn(config).map_err(|e| SessionError::WorkspaceSpawn {
            workspace,
            source: Box::new(e),
        })
    }

    fn try_spawn(&self, config: &SessionConfig) -> anyhow::Result<SpawnedSession> {
        let pty_system = native_pty_system();
        let pair = pty_system.openpty(PtySize {
            rows: config.rows,
            cols: config.cols,
            pixel_width: 0,
            pixel_height: 0,
        })?;

        let mut cmd = match (config.command.first(), &self.config.shell) {
            (Some(program), _) => {
                let mut cmd = CommandBuilder::new(program);
                cmd.args(&config.command[1..]);
                cmd
            }
            (None, Some(shell)) => CommandBuilder::new(shell),
            (None, None) => CommandBuilder::new_default_prog(),
        };
        cmd.cwd(&config.cwd);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair.slave.spawn_command(cmd)?;
        // Dropping the slave is what lets the master read EOF on exit.
        drop(pair.slave);

        let output = pair.master.try_clone_reader()?;
        let writer = pair.master.take_writer()?;

        let remaps = self
            .settings
            .as_ref()
            .map(|s| s.keyboard_remaps(&config.cwd))
            .unwrap_or_default();

        let handle = Arc::new(SessionHandle::new(
            SessionId::generate(),
            config.clone(),
            pair.master,
            writer,
            child,
            self.config.ring_capacity,
            remaps,
        ));

        Ok(SpawnedSession { handle, output })
    }

    // ========== Control operations ==========

    /// Write bytes to a session's input stream.
    pub fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), SessionError> {
        self.session(id)?.write_bytes(data)
    }

    /// Write a named key, encoded per the session's negotiated keyboard
    /// protocol and any per-repository remap override. Unknown key names
    /// are dropped with a debug log rather than erroring, since remap
    /// tables come from user config.
    pub fn write_key(&self, id: &SessionId, key: &str) -> Result<(), SessionError> {
        let handle = self.session(id)?;
        match keyboard::encode_key(key, handle.kitty_flags(), handle.remaps()) {
            Some(bytes) => handle.write_bytes(&bytes),
            None => {
                debug!(session_id = %id, key, "unknown key name; nothing written");
                Ok(())
            }
        }
    }

    /// Send an interrupt (ctrl-c) to the session.
    pub fn interrupt(&self, id: &SessionId) -> Result<(), SessionError> {
        self.write(id, b"\x03")
    }

    pub fn resize(&self, id: &SessionId, rows: u16, cols: u16) -> Result<(), SessionError> {
        self.session(id)?.resize(rows, cols)
    }

    /// Stop forwarding raw output to renderer subscribers. The process
    /// keeps running, the ring buffer keeps filling, and structured-event
    /// detection continues.
    pub fn pause(&self, id: &SessionId) -> Result<(), SessionError> {
        self.session(id)?.set_paused(true);
        Ok(())
    }

    pub fn resume(&self, id: &SessionId) -> Result<(), SessionError> {
        self.session(id)?.set_paused(false);
        Ok(())
    }

    /// Close a session: bring the child down, drain the reader thread, and
    /// emit the exit notification. Idempotent - closing an unknown or
    /// already-closed id is Ok.
    ///
    /// Teardown races with natural exit through [`SessionRegistry::finish`]:
    /// whichever path takes the child handle runs the whole sequence, the
    /// other becomes a no-op, so there is exactly one exit notification.
    pub fn close(&self, id: &SessionId, mode: CloseMode) -> Result<(), SessionError> {
        let Some((handle, mut child)) = self.registry.finish(id) else {
            debug!(session_id = %id, "close on unknown or already-closed session");
            return Ok(());
        };

        let code = match mode {
            CloseMode::Graceful => {
                if let Some(pid) = handle.pid() {
                    super::process::terminate(pid);
                }
                let deadline = Instant::now() + GRACE_PERIOD;
                loop {
                    match child.try_wait() {
                        Ok(Some(status)) => break status.exit_code() as i32,
                        Ok(None) if Instant::now() < deadline => {
                            std::thread::sleep(Duration::from_millis(25));
                        }
                        _ => {
                            let _ = child.kill();
                            break child.wait().map(|s| s.exit_code() as i32).unwrap_or(-1);
                        }
                    }
                }
            }
            CloseMode::Force => {
                let _ = child.kill();
                child.wait().map(|s| s.exit_code() as i32).unwrap_or(-1)
            }
        };

        // The killed child produces EOF on the PTY, which is the reader's
        // only cancellation signal; join it so buffered output lands before
        // the exit notification.
        if let Some(thread) = handle.take_reader_thread() {
            let _ = thread.join();
        }
        handle.emit(SessionEvent::Exit(code));
        info!(session_id = %id, code, "session closed");
        Ok(())
    }

    // ========== Queries ==========

    /// Subscribe to a session's event stream. Late subscribers can replay
    /// missed output via [`Self::scrollback`].
    pub fn subscribe(
        &self,
        id: &SessionId,
    ) -> Result<broadcast::Receiver<SessionEvent>, SessionError> {
        Ok(self.session(id)?.subscribe())
    }

    /// Snapshot of the session's retained scrollback bytes.
    pub fn scrollback(&self, id: &SessionId) -> Result<Vec<u8>, SessionError> {
        Ok(self.session(id)?.scrollback())
    }

    pub fn info(&self, id: &SessionId) -> Result<SessionInfo, SessionError> {
        Ok(self.session(id)?.info())
    }

    /// Best-effort introspection of the foreground process. `None` for
    /// unknown sessions or platform failures, never a hard error.
    pub fn query_foreground_process(&self, id: &SessionId) -> Option<ProcessInfo> {
        self.registry.get(id)?.foreground_process()
    }

    pub fn get_stats(&self) -> SessionStats {
        self.registry.stats()
    }

    pub fn list_active_sessions(&self) -> Vec<SessionId> {
        self.registry.list_active()
    }

    /// Close every live session and stop the idle sweeper.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(sweeper) = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = sweeper.join();
        }
        for id in self.registry.list_active() {
            let _ = self.close(&id, CloseMode::Graceful);
        }
    }

    fn session(&self, id: &SessionId) -> Result<Arc<SessionHandle>, SessionError> {
        self.registry
            .get(id)
            .filter(|handle| handle.is_alive())
            .ok_or_else(|| SessionError::SessionNotFound(id.clone()))
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Plugins holding `pty:write` reach sessions through this seam.
impl PtySink for SessionOrchestrator {
    fn write_session(&self, id: &SessionId, data: &[u8]) -> Result<(), SessionError> {
        self.write(id, data)
    }
}

struct SpawnedSession {
    handle: Arc<SessionHandle>,
    output: Box<dyn std::io::Read + Send>,
}

/// Background thread turning per-session silence into an implicit
/// awaiting-input signal, for tools whose question format no line pattern
/// recognizes. Any new output re-arms the timer; the signal fires at most
/// once per silence window.
fn spawn_idle_sweeper(
    registry: Arc<SessionRegistry>,
    plugins: Arc<PluginRegistry>,
    threshold: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(SWEEP_INTERVAL);
            for handle in registry.handles() {
                if !handle.is_alive() || !handle.check_idle(threshold) {
                    continue;
                }
                debug!(session_id = %handle.id, "session idle; emitting awaiting-input");
                let event = ParsedEvent::new(
                    handle.id.clone(),
                    EventKind::AwaitingInput {
                        kind: AwaitingKind::Question,
                        prompt: String::new(),
                    },
                );
                handle.emit(SessionEvent::Parsed(event.clone()));
                plugins.dispatch_event(&event);
            }
        }
    })
}
