//! The capability-gated API surface handed to plugins.
//!
//! A [`HostHandle`] is minted per registration (it carries the plugin's id
//! and generation), so handles held by a superseded registration of the
//! same id are inert rather than dangling. Tier-1 registration methods are
//! always available; write actions and sandboxed fs/net access require the
//! matching capability in the plugin's manifest.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{ParsedEvent, SessionId};
use crate::terminal::SessionError;

use super::capability::Capability;
use super::contrib::{ActivityItem, ActivityItemUpdate, HostAction, MarkdownProvider, Section};
use super::manifest::PluginManifest;
use super::registry::{
    EventCallback, HandlerEntry, ProviderEntry, Shared, WatcherCallback, WatcherEntry,
};
use super::PluginError;

/// Largest file `read_file` will return.
const MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

/// Writes plugin bytes into a session. Implemented by the orchestrator.
pub trait PtySink: Send + Sync {
    fn write_session(&self, id: &SessionId, data: &[u8]) -> Result<(), SessionError>;
}

/// Outbound HTTP collaborator for `net:http` plugins. The core only does
/// the allow-list check; the transport itself is injected.
pub trait HttpTransport: Send + Sync {
    fn fetch(&self, url: &str) -> anyhow::Result<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// A revocable registration. All handles minted during a plugin's lifetime
/// are revoked when it is unregistered; dropping the handle itself does
/// nothing (disposal is explicit or bulk-on-unload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationHandle {
    pub(crate) token: u64,
}

impl RegistrationHandle {
    pub(crate) const INERT: RegistrationHandle = RegistrationHandle { token: 0 };
}

#[derive(Clone)]
pub struct HostHandle {
    shared: Arc<Shared>,
    manifest: Arc<PluginManifest>,
    generation: u64,
}

impl HostHandle {
    pub(crate) fn new(shared: Arc<Shared>, manifest: Arc<PluginManifest>, generation: u64) -> Self {
        Self {
            shared,
            manifest,
            generation,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.manifest.id
    }

    /// True while this handle belongs to the current registration of its
    /// plugin id. A handle from a superseded registration goes inert.
    fn is_live(&self) -> bool {
        self.shared.generation_of(&self.manifest.id) == Some(self.generation)
    }

    fn require(&self, capability: Capability) -> Result<(), PluginError> {
        if self.manifest.has_capability(capability) {
            return Ok(());
        }
        warn!(
            plugin_id = %self.manifest.id,
            capability = %capability,
            "capability denied"
        );
        Err(PluginError::CapabilityDenied {
            plugin: self.manifest.id.clone(),
            capability,
        })
    }

    // ========== Tier 1: registrations (always available) ==========

    /// Register a section in the activity center dropdown.
    pub fn register_section(&self, section: Section) -> RegistrationHandle {
        if !self.is_live() {
            return RegistrationHandle::INERT;
        }
        self.shared
            .add_section(&self.manifest.id, self.generation, section)
    }

    /// Watch ANSI-stripped output lines for a pattern.
    ///
    /// Callbacks run synchronously on the session's reader thread and must
    /// be fast; long-running work has to be deferred by the watcher itself.
    pub fn register_output_watcher(
        &self,
        pattern: Regex,
        callback: WatcherCallback,
    ) -> RegistrationHandle {
        if !self.is_live() {
            return RegistrationHandle::INERT;
        }
        self.shared.add_watcher(WatcherEntry {
            plugin_id: self.manifest.id.clone(),
            generation: self.generation,
            token: self.shared.next_token(),
            pattern,
            callback,
        })
    }

    /// Handle structured events of one type (e.g. `"rate-limit"`).
    pub fn register_event_handler(
        &self,
        event_type: impl Into<String>,
        callback: EventCallback,
    ) -> RegistrationHandle {
        if !self.is_live() {
            return RegistrationHandle::INERT;
        }
        self.shared.add_handler(HandlerEntry {
            plugin_id: self.manifest.id.clone(),
            generation: self.generation,
            token: self.shared.next_token(),
            event_type: event_type.into(),
            callback,
        })
    }

    /// Provide markdown for `scheme:...` content URIs.
    pub fn register_markdown_provider(
        &self,
        scheme: impl Into<String>,
        provider: Arc<dyn MarkdownProvider>,
    ) -> RegistrationHandle {
        if !self.is_live() {
            return RegistrationHandle::INERT;
        }
        self.shared.add_provider(ProviderEntry {
            plugin_id: self.manifest.id.clone(),
            generation: self.generation,
            token: self.shared.next_token(),
            scheme: scheme.into(),
            provider,
        })
    }

    /// Explicitly revoke a single registration.
    pub fn dispose(&self, handle: RegistrationHandle) {
        self.shared.revoke_token(handle.token);
    }

    // ========== Activity items ==========

    pub fn add_item(&self, item: ActivityItem) {
        if !self.is_live() {
            debug!(plugin_id = %self.manifest.id, "stale handle; add_item ignored");
            return;
        }
        self.shared.add_item(&self.manifest.id, item);
    }

    pub fn update_item(&self, id: &str, update: ActivityItemUpdate) {
        if self.is_live() {
            self.shared.update_item(&self.manifest.id, id, update);
        }
    }

    pub fn remove_item(&self, id: &str) {
        if self.is_live() {
            self.shared.remove_item(&self.manifest.id, id);
        }
    }

    // ========== Tier 2: read-only snapshots ==========

    pub fn active_repo(&self) -> Option<super::registry::RepoSnapshot> {
        self.shared.active_repo()
    }

    pub fn active_terminal_session(&self) -> Option<SessionId> {
        self.shared.active_session()
    }

    // ========== Tier 3: capability-gated write actions ==========

    /// Write bytes into a session (requires `pty:write`).
    pub fn write_pty(&self, session_id: &SessionId, data: &[u8]) -> Result<(), PluginError> {
        self.require(Capability::PtyWrite)?;
        let sink = self
            .shared
            .pty_sink()
            .ok_or(PluginError::NoSessionSink)?;
        sink.write_session(session_id, data)?;
        Ok(())
    }

    /// Open a markdown panel for a content URI (requires `ui:markdown`).
    pub fn open_markdown_panel(
        &self,
        title: impl Into<String>,
        content_uri: impl Into<String>,
    ) -> Result<(), PluginError> {
        self.require(Capability::UiMarkdown)?;
        self.shared.send_action(HostAction::OpenMarkdownPanel {
            title: title.into(),
            content_uri: content_uri.into(),
        });
        Ok(())
    }

    /// Play the notification sound (requires `ui:sound`).
    pub fn play_notification_sound(&self) -> Result<(), PluginError> {
        self.require(Capability::UiSound)?;
        self.shared.send_action(HostAction::PlayNotificationSound);
        Ok(())
    }

    /// Open a sandboxed HTML panel (requires `ui:panel`).
    pub fn open_panel(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
        html: impl Into<String>,
    ) -> Result<(), PluginError> {
        self.require(Capability::UiPanel)?;
        self.shared.send_action(HostAction::OpenPanel {
            id: id.into(),
            title: title.into(),
            html: html.into(),
        });
        Ok(())
    }

    /// Fetch a URL (requires `net:http` and an allow-list match).
    pub fn http_fetch(&self, url: &str) -> Result<HttpResponse, PluginError> {
        self.require(Capability::NetHttp)?;
        if !self.manifest.url_allowed(url) {
            warn!(plugin_id = %self.manifest.id, url, "url not in allow-list");
            return Err(PluginError::UrlNotAllowed(url.to_string()));
        }
        let transport = self.shared.http().ok_or(PluginError::NoHttpTransport)?;
        transport
            .fetch(url)
            .map_err(|e| PluginError::Transport(e.to_string()))
    }

    // ========== Tier 3b: sandboxed filesystem ==========

    /// Read a file inside the allow-list (requires `fs:read`).
    ///
    /// The path is canonicalized first, so symlinks and `..` cannot escape
    /// the sandbox.
    pub fn read_file(&self, path: &Path) -> Result<String, PluginError> {
        self.require(Capability::FsRead)?;
        let canonical = self.sandboxed(path)?;
        let size = std::fs::metadata(&canonical)?.len();
        if size > MAX_READ_BYTES {
            return Err(PluginError::FileTooLarge {
                path: canonical,
                size,
                max: MAX_READ_BYTES,
            });
        }
        Ok(std::fs::read_to_string(&canonical)?)
    }

    /// List a directory inside the allow-list (requires `fs:list`).
    pub fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, PluginError> {
        self.require(Capability::FsList)?;
        let canonical = self.sandboxed(path)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&canonical)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn sandboxed(&self, path: &Path) -> Result<PathBuf, PluginError> {
        let canonical = path
            .canonicalize()
            .map_err(|_| PluginError::PathNotAllowed(path.to_path_buf()))?;
        if !self
            .manifest
            .path_allowed(&canonical, self.shared.home())
        {
            warn!(plugin_id = %self.manifest.id, path = %canonical.display(), "path not in allow-list");
            return Err(PluginError::PathNotAllowed(canonical));
        }
        Ok(canonical)
    }
}
