//! Sandboxed plugin host.
//!
//! Plugins are third-party extensions that react to terminal signals
//! (pattern matches on output lines, structured events from the parser)
//! and contribute UI surface (activity items, markdown content). They run
//! behind a fixed trait interface with capability gating: a plugin only
//! gets the host operations its manifest declares.

pub mod capability;
pub mod contrib;
pub mod host;
pub mod manifest;
mod registry;

pub use capability::Capability;
pub use contrib::{ActivityItem, ActivityItemUpdate, HostAction, MarkdownProvider, Section};
pub use host::{HostHandle, HttpResponse, HttpTransport, PtySink, RegistrationHandle};
pub use manifest::{ManifestError, PluginManifest};
pub use registry::{EventCallback, PluginRegistry, RepoSnapshot, WatcherCallback};

use std::path::PathBuf;

/// The fixed interface every plugin implements.
///
/// `on_load` receives the host handle and performs all registrations;
/// every registration is tracked and revoked on unload. Panics in either
/// hook are contained by the registry.
pub trait Plugin: Send {
    /// Must match the manifest id.
    fn id(&self) -> &str;

    /// Called once when the plugin is registered.
    fn on_load(&mut self, host: &HostHandle) -> anyhow::Result<()>;

    /// Called before the plugin's registrations are revoked. Clean up
    /// custom resources here; host registrations are disposed automatically.
    fn on_unload(&mut self) {}
}

/// Typed failures of the plugin boundary.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin {plugin} requires capability \"{capability}\"")]
    CapabilityDenied {
        plugin: String,
        capability: Capability,
    },

    #[error("plugin {plugin} failed to load: {message}")]
    LoadFailed { plugin: String, message: String },

    #[error("url not in the allow-list: {0}")]
    UrlNotAllowed(String),

    #[error("path not in the allow-list: {}", .0.display())]
    PathNotAllowed(PathBuf),

    #[error("file too large: {} ({size} bytes, max {max})", path.display())]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max: u64,
    },

    #[error("no http transport configured")]
    NoHttpTransport,

    #[error("no session sink configured")]
    NoSessionSink,

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("session write failed: {0}")]
    SessionWrite(#[from] crate::terminal::SessionError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, ParsedEvent, SessionId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test plugin that counts watcher/handler invocations, optionally
    /// panicking in its watcher.
    struct CountingPlugin {
        id: String,
        hits: Arc<AtomicUsize>,
        panic_in_watcher: bool,
    }

    impl Plugin for CountingPlugin {
        fn id(&self) -> &str {
            &self.id
        }

        fn on_load(&mut self, host: &HostHandle) -> anyhow::Result<()> {
            let hits = Arc::clone(&self.hits);
            let panic_in_watcher = self.panic_in_watcher;
            host.register_output_watcher(
                regex::Regex::new(r"deploy (\w+)").unwrap(),
                Box::new(move |_caps, _session| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    if panic_in_watcher {
                        panic!("watcher exploded");
                    }
                }),
            );
            let hits = Arc::clone(&self.hits);
            host.register_event_handler(
                "rate-limit",
                Box::new(move |_event| {
                    hits.fetch_add(100, Ordering::SeqCst);
                }),
            );
            Ok(())
        }
    }

    fn manifest_json(json: &str) -> PluginManifest {
        PluginManifest::from_json(json).unwrap()
    }

    fn manifest(id: &str) -> PluginManifest {
        PluginManifest::from_json(&format!(
            r#"{{"id": "{id}", "name": "Test", "version": "1.0.0"}}"#
        ))
        .unwrap()
    }

    fn counting(id: &str, hits: Arc<AtomicUsize>, panic_in_watcher: bool) -> Box<dyn Plugin> {
        Box::new(CountingPlugin {
            id: id.to_string(),
            hits,
            panic_in_watcher,
        })
    }

    fn rate_limit_event() -> ParsedEvent {
        ParsedEvent::new(
            SessionId::from("term-test"),
            EventKind::RateLimit {
                pattern: "http-429".into(),
                agent: crate::domain::AgentFamily::Generic,
                retry_after_ms: None,
            },
        )
    }

    #[test]
    fn test_line_dispatch_reaches_watcher() {
        let registry = PluginRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry
            .register(manifest("counter"), counting("counter", hits.clone(), false))
            .unwrap();

        registry.dispatch_line("deploy staging", &SessionId::from("term-a"));
        registry.dispatch_line("no match here", &SessionId::from("term-a"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_watcher_does_not_starve_siblings() {
        let registry = PluginRegistry::new();
        let bad_hits = Arc::new(AtomicUsize::new(0));
        let good_hits = Arc::new(AtomicUsize::new(0));
        registry
            .register(manifest("bad"), counting("bad", bad_hits.clone(), true))
            .unwrap();
        registry
            .register(manifest("good"), counting("good", good_hits.clone(), false))
            .unwrap();

        registry.dispatch_line("deploy prod", &SessionId::from("term-a"));
        assert_eq!(bad_hits.load(Ordering::SeqCst), 1);
        assert_eq!(good_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_dispatch_in_registration_order() {
        let registry = PluginRegistry::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        registry
            .register(manifest("first"), counting("first", a.clone(), false))
            .unwrap();
        registry
            .register(manifest("second"), counting("second", b.clone(), false))
            .unwrap();

        registry.dispatch_event(&rate_limit_event());
        assert_eq!(a.load(Ordering::SeqCst), 100);
        assert_eq!(b.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_unregister_revokes_handlers() {
        let registry = PluginRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry
            .register(manifest("gone"), counting("gone", hits.clone(), false))
            .unwrap();
        assert!(registry.unregister("gone"));

        registry.dispatch_event(&rate_limit_event());
        registry.dispatch_line("deploy prod", &SessionId::from("term-a"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!registry.unregister("gone"));
    }

    #[test]
    fn test_reregister_supersedes_previous_instance() {
        let registry = PluginRegistry::new();
        let old_hits = Arc::new(AtomicUsize::new(0));
        let new_hits = Arc::new(AtomicUsize::new(0));
        registry
            .register(manifest("dup"), counting("dup", old_hits.clone(), false))
            .unwrap();
        registry
            .register(manifest("dup"), counting("dup", new_hits.clone(), false))
            .unwrap();

        registry.dispatch_line("deploy prod", &SessionId::from("term-a"));
        assert_eq!(old_hits.load(Ordering::SeqCst), 0);
        assert_eq!(new_hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capability_denied_for_undeclared() {
        struct Needy {
            result: Arc<std::sync::Mutex<Option<PluginError>>>,
        }
        impl Plugin for Needy {
            fn id(&self) -> &str {
                "needy"
            }
            fn on_load(&mut self, host: &HostHandle) -> anyhow::Result<()> {
                let err = host
                    .write_pty(&SessionId::from("term-x"), b"y\n")
                    .unwrap_err();
                *self.result.lock().unwrap() = Some(err);
                Ok(())
            }
        }

        let registry = PluginRegistry::new();
        let result = Arc::new(std::sync::Mutex::new(None));
        registry
            .register(
                manifest("needy"),
                Box::new(Needy {
                    result: result.clone(),
                }),
            )
            .unwrap();
        assert!(matches!(
            result.lock().unwrap().take(),
            Some(PluginError::CapabilityDenied { .. })
        ));
    }

    #[test]
    fn test_id_mismatch_rejected() {
        let registry = PluginRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let result = registry.register(manifest("expected"), counting("actual", hits, false));
        assert!(matches!(
            result,
            Err(PluginError::Manifest(ManifestError::IdMismatch { .. }))
        ));
    }

    #[test]
    fn test_sound_action_flows_to_ui_channel() {
        struct Noisy;
        impl Plugin for Noisy {
            fn id(&self) -> &str {
                "noisy"
            }
            fn on_load(&mut self, host: &HostHandle) -> anyhow::Result<()> {
                host.play_notification_sound()?;
                Ok(())
            }
        }

        let registry = PluginRegistry::new();
        let mut actions = registry.take_actions().unwrap();
        registry
            .register(
                manifest_json(
                    r#"{"id": "noisy", "name": "Noisy", "version": "1.0.0",
                        "capabilities": ["ui:sound"]}"#,
                ),
                Box::new(Noisy),
            )
            .unwrap();
        assert!(matches!(
            actions.try_recv(),
            Ok(HostAction::PlayNotificationSound)
        ));
        // Second take returns nothing; the channel was already consumed
        assert!(registry.take_actions().is_none());
    }

    #[test]
    fn test_sections_ordered_and_items_swept_on_unload() {
        struct Contributor;
        impl Plugin for Contributor {
            fn id(&self) -> &str {
                "contrib"
            }
            fn on_load(&mut self, host: &HostHandle) -> anyhow::Result<()> {
                host.register_section(Section {
                    id: "later".into(),
                    label: "Later".into(),
                    priority: 10,
                    can_dismiss_all: false,
                });
                host.register_section(Section {
                    id: "first".into(),
                    label: "First".into(),
                    priority: 1,
                    can_dismiss_all: true,
                });
                host.add_item(ActivityItem {
                    id: "item-1".into(),
                    plugin_id: "contrib".into(),
                    section_id: "first".into(),
                    title: "One".into(),
                    subtitle: None,
                    icon: "<svg/>".into(),
                    icon_color: None,
                    dismissible: true,
                    content_uri: None,
                });
                Ok(())
            }
        }

        let registry = PluginRegistry::new();
        registry
            .register(manifest("contrib"), Box::new(Contributor))
            .unwrap();

        let sections = registry.sections();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].id, "first");
        assert_eq!(sections[1].id, "later");
        assert_eq!(registry.items().len(), 1);

        registry.unregister("contrib");
        assert!(registry.sections().is_empty());
        assert!(registry.items().is_empty());
    }

    #[test]
    fn test_markdown_provider() {
        struct Docs;
        impl MarkdownProvider for Docs {
            fn provide(&self, uri: &str) -> Option<String> {
                uri.strip_prefix("docs:").map(|rest| format!("# {rest}"))
            }
        }
        struct DocPlugin;
        impl Plugin for DocPlugin {
            fn id(&self) -> &str {
                "doc-plugin"
            }
            fn on_load(&mut self, host: &HostHandle) -> anyhow::Result<()> {
                host.register_markdown_provider("docs", Arc::new(Docs));
                Ok(())
            }
        }

        let registry = PluginRegistry::new();
        registry
            .register(manifest("doc-plugin"), Box::new(DocPlugin))
            .unwrap();
        assert_eq!(
            registry.provide_markdown("docs:hello"),
            Some("# hello".to_string())
        );
        registry.unregister("doc-plugin");
        assert_eq!(registry.provide_markdown("docs:hello"), None);
    }
}
