//! A single live PTY session.
//!
//! [`SessionHandle`] is the shared per-session record: the registry owns the
//! authoritative map of them, the session's reader thread holds one `Arc` to
//! publish output, and the orchestrator's control plane holds clones to
//! service write/resize/pause calls. Every mutable field is individually
//! synchronized so control-plane operations on one session never contend
//! with any other session.

use chrono::{DateTime, Utc};
use portable_pty::{Child, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::domain::{ParsedEvent, ProcessInfo, SessionConfig, SessionId, SessionInfo};

use super::keyboard::KeyboardProtocol;
use super::ring::OutputRing;
use super::SessionError;

/// Events delivered to renderer subscribers of one session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Raw output bytes, verbatim. Suppressed while the session is paused.
    Data(Vec<u8>),
    /// A structured event extracted from the output. Emitted regardless of
    /// the pause flag so signal detection never goes silent.
    Parsed(ParsedEvent),
    /// The child process exited with this code. Emitted exactly once.
    Exit(i32),
}

/// Capacity of the per-session event broadcast. Slow subscribers lag and
/// skip frames rather than applying backpressure to the reader thread.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct SessionHandle {
    pub id: SessionId,
    config: SessionConfig,
    created_at: DateTime<Utc>,
    pid: Option<u32>,

    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    /// Taken exactly once at teardown; whoever takes it owns the teardown.
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,

    size: Mutex<(u16, u16)>,
    alive: AtomicBool,
    paused: AtomicBool,
    keyboard: Mutex<KeyboardProtocol>,
    ring: Mutex<OutputRing>,
    remaps: HashMap<String, String>,

    event_tx: broadcast::Sender<SessionEvent>,

    last_output: Mutex<Instant>,
    idle_notified: AtomicBool,
}

impl SessionHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SessionId,
        config: SessionConfig,
        master: Box<dyn MasterPty + Send>,
        writer: Box<dyn Write + Send>,
        child: Box<dyn Child + Send + Sync>,
        ring_capacity: usize,
        remaps: HashMap<String, String>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let size = (config.rows, config.cols);
        let pid = child.process_id();
        Self {
            id,
            config,
            created_at: Utc::now(),
            pid,
            master: Mutex::new(master),
            writer: Mutex::new(writer),
            child: Mutex::new(Some(child)),
            reader_thread: Mutex::new(None),
            size: Mutex::new(size),
            alive: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            keyboard: Mutex::new(KeyboardProtocol::new()),
            ring: Mutex::new(OutputRing::new(ring_capacity)),
            remaps,
            event_tx,
            last_output: Mutex::new(Instant::now()),
            idle_notified: AtomicBool::new(false),
        }
    }

    // ========== Event fan-out ==========

    /// Subscribe to this session's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers. A send error only means there are
    /// currently no subscribers.
    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    // ========== I/O ==========

    /// Write bytes to the child's input stream.
    pub fn write_bytes(&self, data: &[u8]) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(|source| SessionError::Io {
                id: self.id.clone(),
                source,
            })
    }

    /// Resize the OS-level terminal and the in-memory record together, so a
    /// concurrent `info()` never sees one without the other.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        let master = self.master.lock().unwrap_or_else(|e| e.into_inner());
        let mut size = self.size.lock().unwrap_or_else(|e| e.into_inner());
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::Io {
                id: self.id.clone(),
                source: std::io::Error::other(e),
            })?;
        *size = (rows, cols);
        Ok(())
    }

    // ========== Flags ==========

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn set_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    // ========== Keyboard protocol ==========

    pub fn kitty_flags(&self) -> u8 {
        self.keyboard
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flags()
    }

    pub(crate) fn with_keyboard<R>(&self, f: impl FnOnce(&mut KeyboardProtocol) -> R) -> R {
        let mut kb = self.keyboard.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut kb)
    }

    pub fn remaps(&self) -> &HashMap<String, String> {
        &self.remaps
    }

    // ========== Ring buffer ==========

    pub(crate) fn ring_write(&self, data: &[u8]) {
        self.ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .write(data);
    }

    /// Snapshot of the retained scrollback bytes for late subscribers.
    pub fn scrollback(&self) -> Vec<u8> {
        self.ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    // ========== Idle tracking ==========

    /// Record that output arrived; re-arms the idle signal.
    pub(crate) fn note_output(&self) {
        *self.last_output.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
        self.idle_notified.store(false, Ordering::SeqCst);
    }

    /// True exactly once per silence window: when the session has produced
    /// no output for `threshold` and the signal has not fired yet.
    pub(crate) fn check_idle(&self, threshold: Duration) -> bool {
        let elapsed = self
            .last_output
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed();
        if elapsed < threshold {
            return false;
        }
        !self.idle_notified.swap(true, Ordering::SeqCst)
    }

    // ========== Teardown ==========

    /// Take ownership of the child handle. Returns `None` if another caller
    /// already took it - at most one of {explicit close, natural exit} wins.
    pub(crate) fn take_child(&self) -> Option<Box<dyn Child + Send + Sync>> {
        self.child.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub(crate) fn set_reader_thread(&self, handle: JoinHandle<()>) {
        *self
            .reader_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    pub(crate) fn take_reader_thread(&self) -> Option<JoinHandle<()>> {
        self.reader_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    // ========== Introspection ==========

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Best-effort query of the process holding the terminal's foreground
    /// process group. Failures degrade to `None`.
    pub fn foreground_process(&self) -> Option<ProcessInfo> {
        let master = self.master.lock().unwrap_or_else(|e| e.into_inner());
        super::process::foreground_process(master.as_ref())
    }

    pub fn info(&self) -> SessionInfo {
        let (rows, cols) = *self.size.lock().unwrap_or_else(|e| e.into_inner());
        SessionInfo {
            id: self.id.clone(),
            command: self.config.command.clone(),
            cwd: self.config.cwd.clone(),
            rows,
            cols,
            alive: self.is_alive(),
            paused: self.is_paused(),
            created_at: self.created_at,
            tab: self.config.tab.clone(),
        }
    }
}
