//! Plugin registry: lifecycle, dispatch tables, isolation.
//!
//! The registry owns every loaded plugin and the dispatch tables their
//! registrations live in. Dispatch snapshots the relevant table outside the
//! lock and isolates each callback with `catch_unwind`, so one broken
//! watcher can neither starve its siblings nor crash the reader thread
//! that called in.

use regex::Regex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::{ParsedEvent, SessionId};

use super::contrib::{ActivityItem, ActivityItemUpdate, HostAction, MarkdownProvider, Section};
use super::host::{HostHandle, HttpTransport, PtySink, RegistrationHandle};
use super::manifest::{ManifestError, PluginManifest};
use super::{Plugin, PluginError};

pub type WatcherCallback = Box<dyn Fn(&regex::Captures<'_>, &SessionId) + Send + Sync>;
pub type EventCallback = Box<dyn Fn(&ParsedEvent) + Send + Sync>;

pub(crate) struct WatcherEntry {
    pub plugin_id: String,
    pub generation: u64,
    pub token: u64,
    pub pattern: Regex,
    pub callback: WatcherCallback,
}

pub(crate) struct HandlerEntry {
    pub plugin_id: String,
    pub generation: u64,
    pub token: u64,
    pub event_type: String,
    pub callback: EventCallback,
}

pub(crate) struct ProviderEntry {
    pub plugin_id: String,
    #[allow(dead_code)]
    pub generation: u64,
    pub token: u64,
    pub scheme: String,
    pub provider: Arc<dyn MarkdownProvider>,
}

struct OwnedSection {
    plugin_id: String,
    token: u64,
    section: Section,
}

#[derive(Default)]
struct DispatchTables {
    watchers: Vec<Arc<WatcherEntry>>,
    handlers: Vec<Arc<HandlerEntry>>,
    providers: Vec<Arc<ProviderEntry>>,
    sections: Vec<OwnedSection>,
    items: Vec<ActivityItem>,
}

/// Read-only snapshot of the active repository, exposed to plugins.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RepoSnapshot {
    pub path: PathBuf,
    pub display_name: String,
    pub branch: Option<String>,
}

#[derive(Default)]
struct HostState {
    active_repo: Option<RepoSnapshot>,
    active_session: Option<SessionId>,
}

/// State shared between the registry and every minted [`HostHandle`].
pub(crate) struct Shared {
    tables: Mutex<DispatchTables>,
    state: Mutex<HostState>,
    /// Current generation per plugin id; absent means not loaded.
    generations: Mutex<HashMap<String, u64>>,
    actions_tx: mpsc::UnboundedSender<HostAction>,
    pty_sink: Mutex<Option<Weak<dyn PtySink>>>,
    http: Mutex<Option<Arc<dyn HttpTransport>>>,
    next_token: AtomicU64,
    home: PathBuf,
}

impl Shared {
    pub(crate) fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn generation_of(&self, plugin_id: &str) -> Option<u64> {
        self.generations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(plugin_id)
            .copied()
    }

    pub(crate) fn add_watcher(&self, entry: WatcherEntry) -> RegistrationHandle {
        let token = entry.token;
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .watchers
            .push(Arc::new(entry));
        RegistrationHandle { token }
    }

    pub(crate) fn add_handler(&self, entry: HandlerEntry) -> RegistrationHandle {
        let token = entry.token;
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handlers
            .push(Arc::new(entry));
        RegistrationHandle { token }
    }

    pub(crate) fn add_provider(&self, entry: ProviderEntry) -> RegistrationHandle {
        let token = entry.token;
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .providers
            .push(Arc::new(entry));
        RegistrationHandle { token }
    }

    pub(crate) fn add_section(
        &self,
        plugin_id: &str,
        _generation: u64,
        section: Section,
    ) -> RegistrationHandle {
        let token = self.next_token();
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.sections.push(OwnedSection {
            plugin_id: plugin_id.to_string(),
            token,
            section,
        });
        tables.sections.sort_by_key(|s| s.section.priority);
        RegistrationHandle { token }
    }

    pub(crate) fn add_item(&self, plugin_id: &str, item: ActivityItem) {
        if item.plugin_id != plugin_id {
            warn!(plugin_id, item_plugin = %item.plugin_id, "item plugin_id mismatch; ignored");
            return;
        }
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = tables.items.iter_mut().find(|i| i.id == item.id) {
            *existing = item;
        } else {
            tables.items.push(item);
        }
    }

    pub(crate) fn update_item(&self, plugin_id: &str, id: &str, update: ActivityItemUpdate) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = tables
            .items
            .iter_mut()
            .find(|i| i.id == id && i.plugin_id == plugin_id)
        {
            if let Some(title) = update.title {
                item.title = title;
            }
            if let Some(subtitle) = update.subtitle {
                item.subtitle = subtitle;
            }
            if let Some(icon_color) = update.icon_color {
                item.icon_color = icon_color;
            }
            if let Some(content_uri) = update.content_uri {
                item.content_uri = content_uri;
            }
        }
    }

    pub(crate) fn remove_item(&self, plugin_id: &str, id: &str) {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .items
            .retain(|i| !(i.id == id && i.plugin_id == plugin_id));
    }

    pub(crate) fn revoke_token(&self, token: u64) {
        if token == 0 {
            return;
        }
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.watchers.retain(|w| w.token != token);
        tables.handlers.retain(|h| h.token != token);
        tables.providers.retain(|p| p.token != token);
        tables.sections.retain(|s| s.token != token);
    }

    pub(crate) fn send_action(&self, action: HostAction) {
        let _ = self.actions_tx.send(action);
    }

    pub(crate) fn pty_sink(&self) -> Option<Arc<dyn PtySink>> {
        self.pty_sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade)
    }

    pub(crate) fn http(&self) -> Option<Arc<dyn HttpTransport>> {
        self.http.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn home(&self) -> &std::path::Path {
        &self.home
    }

    pub(crate) fn active_repo(&self) -> Option<RepoSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_repo
            .clone()
    }

    pub(crate) fn active_session(&self) -> Option<SessionId> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_session
            .clone()
    }
}

struct LoadedPlugin {
    generation: u64,
    #[allow(dead_code)]
    manifest: Arc<PluginManifest>,
    plugin: Box<dyn Plugin>,
    handles: Vec<RegistrationHandle>,
}

/// The extension host: owns plugins and dispatches terminal signals to
/// their registered watchers and handlers.
pub struct PluginRegistry {
    shared: Arc<Shared>,
    plugins: Mutex<HashMap<String, LoadedPlugin>>,
    next_generation: AtomicU64,
    actions_rx: Mutex<Option<mpsc::UnboundedReceiver<HostAction>>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(DispatchTables::default()),
                state: Mutex::new(HostState::default()),
                generations: Mutex::new(HashMap::new()),
                actions_tx,
                pty_sink: Mutex::new(None),
                http: Mutex::new(None),
                next_token: AtomicU64::new(1),
                home,
            }),
            plugins: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            actions_rx: Mutex::new(Some(actions_rx)),
        }
    }

    /// Take the UI-action channel. Consumed once by the outer UI.
    pub fn take_actions(&self) -> Option<mpsc::UnboundedReceiver<HostAction>> {
        self.actions_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Wire the session writer plugins with `pty:write` go through.
    pub fn set_pty_sink(&self, sink: Weak<dyn PtySink>) {
        *self
            .shared
            .pty_sink
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    /// Wire the HTTP transport for `net:http` plugins.
    pub fn set_http_transport(&self, transport: Arc<dyn HttpTransport>) {
        *self.shared.http.lock().unwrap_or_else(|e| e.into_inner()) = Some(transport);
    }

    pub fn set_active_repo(&self, repo: Option<RepoSnapshot>) {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_repo = repo;
    }

    pub fn set_active_session(&self, session: Option<SessionId>) {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_session = session;
    }

    // ========== Lifecycle ==========

    /// Load a plugin. Re-registering an id unloads the previous instance
    /// first (hot reload); there are never two live registrations for one
    /// id.
    pub fn register(
        &self,
        manifest: PluginManifest,
        mut plugin: Box<dyn Plugin>,
    ) -> Result<(), PluginError> {
        manifest.validate()?;
        if manifest.id != plugin.id() {
            return Err(PluginError::Manifest(ManifestError::IdMismatch {
                manifest: manifest.id.clone(),
                plugin: plugin.id().to_string(),
            }));
        }

        // Hot reload: supersede any previous registration of this id.
        self.unregister(&manifest.id);

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let manifest = Arc::new(manifest);
        self.shared
            .generations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(manifest.id.clone(), generation);

        let host = HostHandle::new(Arc::clone(&self.shared), Arc::clone(&manifest), generation);
        let load_result = catch_unwind(AssertUnwindSafe(|| plugin.on_load(&host)));

        match load_result {
            Ok(Ok(())) => {
                info!(plugin_id = %manifest.id, generation, "plugin loaded");
                self.plugins
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(
                        manifest.id.clone(),
                        LoadedPlugin {
                            generation,
                            manifest: Arc::clone(&manifest),
                            plugin,
                            handles: Vec::new(),
                        },
                    );
                Ok(())
            }
            Ok(Err(e)) => {
                self.sweep_plugin(&manifest.id);
                Err(PluginError::LoadFailed {
                    plugin: manifest.id.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                self.sweep_plugin(&manifest.id);
                Err(PluginError::LoadFailed {
                    plugin: manifest.id.clone(),
                    message: "plugin panicked in on_load".to_string(),
                })
            }
        }
    }

    /// Unload a plugin and revoke everything it registered. Revocation is
    /// best-effort per entry and never propagates a failure; unknown ids
    /// are a no-op.
    pub fn unregister(&self, id: &str) -> bool {
        let loaded = self
            .plugins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        let Some(mut loaded) = loaded else {
            return false;
        };

        if catch_unwind(AssertUnwindSafe(|| loaded.plugin.on_unload())).is_err() {
            warn!(plugin_id = %id, "plugin panicked in on_unload");
        }

        self.sweep_plugin(id);
        info!(
            plugin_id = %id,
            generation = loaded.generation,
            handles = loaded.handles.len(),
            "plugin unloaded"
        );
        true
    }

    /// Remove every table entry owned by a plugin id and kill its
    /// generation so stale handles go inert.
    fn sweep_plugin(&self, id: &str) {
        self.shared
            .generations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        let mut tables = self.shared.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.watchers.retain(|w| w.plugin_id != id);
        tables.handlers.retain(|h| h.plugin_id != id);
        tables.providers.retain(|p| p.plugin_id != id);
        tables.sections.retain(|s| s.plugin_id != id);
        tables.items.retain(|i| i.plugin_id != id);
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.plugins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    // ========== Dispatch ==========

    /// Test every registered output watcher against a clean line, invoking
    /// matching callbacks in registration order. Each callback is isolated:
    /// a panic is logged against the owning plugin and the remaining
    /// watchers still run.
    pub fn dispatch_line(&self, line: &str, session_id: &SessionId) {
        let watchers: Vec<Arc<WatcherEntry>> = {
            let tables = self.shared.tables.lock().unwrap_or_else(|e| e.into_inner());
            tables.watchers.clone()
        };
        for entry in watchers {
            if let Some(caps) = entry.pattern.captures(line) {
                let result = catch_unwind(AssertUnwindSafe(|| (entry.callback)(&caps, session_id)));
                if result.is_err() {
                    warn!(
                        plugin_id = %entry.plugin_id,
                        session_id = %session_id,
                        "output watcher panicked; continuing with remaining watchers"
                    );
                }
            }
        }
    }

    /// Deliver a structured event to every handler registered for its type,
    /// in registration order, with the same per-handler isolation as line
    /// dispatch.
    pub fn dispatch_event(&self, event: &ParsedEvent) {
        let event_type = event.event_type();
        let handlers: Vec<Arc<HandlerEntry>> = {
            let tables = self.shared.tables.lock().unwrap_or_else(|e| e.into_inner());
            tables
                .handlers
                .iter()
                .filter(|h| h.event_type == event_type)
                .cloned()
                .collect()
        };
        for entry in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| (entry.callback)(event)));
            if result.is_err() {
                warn!(
                    plugin_id = %entry.plugin_id,
                    event_type,
                    "event handler panicked; continuing with remaining handlers"
                );
            }
        }
    }

    // ========== UI queries ==========

    /// Resolve a `scheme:...` content URI via the matching provider.
    pub fn provide_markdown(&self, uri: &str) -> Option<String> {
        let scheme = uri.split(':').next()?;
        let provider: Arc<ProviderEntry> = {
            let tables = self.shared.tables.lock().unwrap_or_else(|e| e.into_inner());
            tables
                .providers
                .iter()
                .find(|p| p.scheme == scheme)?
                .clone()
        };
        match catch_unwind(AssertUnwindSafe(|| provider.provider.provide(uri))) {
            Ok(content) => content,
            Err(_) => {
                warn!(plugin_id = %provider.plugin_id, scheme, "markdown provider panicked");
                None
            }
        }
    }

    /// Sections ordered by priority.
    pub fn sections(&self) -> Vec<Section> {
        self.shared
            .tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sections
            .iter()
            .map(|s| s.section.clone())
            .collect()
    }

    /// Current activity items.
    pub fn items(&self) -> Vec<ActivityItem> {
        self.shared
            .tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .items
            .clone()
    }

    /// Number of loaded plugins.
    pub fn len(&self) -> usize {
        self.plugins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.len())
            .finish()
    }
}
