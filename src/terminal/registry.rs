//! Concurrency-safe registry of live sessions.
//!
//! The registry is the single source of truth for "is this session alive".
//! It is accessed from the orchestrator's control plane (spawn/resize/close)
//! and from every session's own reader thread (exit detection), so the map
//! itself is lock-protected and each entry carries its own synchronization
//! (see [`SessionHandle`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use portable_pty::Child;
use tracing::debug;

use crate::domain::{SessionId, SessionStats};

use super::session::SessionHandle;
use super::SessionError;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<SessionHandle>>>,
    /// Live sessions plus in-flight spawns. Reserved before the child is
    /// created so concurrent spawn attempts can never exceed the cap.
    reserved: AtomicUsize,
    max_sessions: usize,
}

/// A reserved capacity slot for an in-flight spawn. Released on drop unless
/// the spawn commits it by inserting the session.
pub struct SlotReservation<'a> {
    registry: &'a SessionRegistry,
    committed: bool,
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.reserved.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            reserved: AtomicUsize::new(0),
            max_sessions,
        }
    }

    /// Atomically claim a capacity slot for a spawn attempt.
    pub fn reserve(&self) -> Result<SlotReservation<'_>, SessionError> {
        let result = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current < self.max_sessions {
                    Some(current + 1)
                } else {
                    None
                }
            });
        match result {
            Ok(_) => Ok(SlotReservation {
                registry: self,
                committed: false,
            }),
            Err(current) => Err(SessionError::CapacityExceeded {
                active: current,
                max: self.max_sessions,
            }),
        }
    }

    /// Insert a freshly spawned session, consuming its reservation.
    pub fn insert(&self, handle: Arc<SessionHandle>, mut slot: SlotReservation<'_>) {
        slot.committed = true;
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(handle.id.clone(), handle);
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Claim the teardown of a session.
    ///
    /// Returns the handle and the child process exactly once per session:
    /// the child handle is taken atomically, so when an explicit close races
    /// a natural exit only one caller performs teardown and the other gets
    /// `None`. The winner is responsible for waiting on the child and
    /// emitting the exit notification.
    pub fn finish(
        &self,
        id: &SessionId,
    ) -> Option<(Arc<SessionHandle>, Box<dyn Child + Send + Sync>)> {
        let handle = self.get(id)?;
        let child = handle.take_child()?;
        handle.set_dead();
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        self.reserved.fetch_sub(1, Ordering::SeqCst);
        debug!(session_id = %id, "session removed from registry");
        Some((handle, child))
    }

    pub fn list_active(&self) -> Vec<SessionId> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// All current handles; used by the idle sweeper and shutdown.
    pub fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active_sessions: self
                .sessions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            max_sessions: self.max_sessions,
        }
    }
}
