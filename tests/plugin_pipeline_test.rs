//! End-to-end tests wiring the plugin host into live sessions: watchers
//! and handlers fed by a real PTY stream, and a capability-holding plugin
//! writing back into the session.

#![cfg(unix)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use common::{collect_until_exit, collected_output, sh, test_orchestrator};
use termdock::plugin::{HostHandle, Plugin, PluginManifest, PtySink};

struct BuildWatcher {
    hits: Arc<AtomicUsize>,
}

impl Plugin for BuildWatcher {
    fn id(&self) -> &str {
        "build-watcher"
    }

    fn on_load(&mut self, host: &HostHandle) -> anyhow::Result<()> {
        let hits = Arc::clone(&self.hits);
        host.register_output_watcher(
            regex::Regex::new(r"BUILD_(\w+)").unwrap(),
            Box::new(move |caps, _session| {
                if &caps[1] == "DONE" {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        Ok(())
    }
}

/// Answers yes/no prompts automatically; needs `pty:write`.
struct AutoConfirm;

impl Plugin for AutoConfirm {
    fn id(&self) -> &str {
        "auto-confirm"
    }

    fn on_load(&mut self, host: &HostHandle) -> anyhow::Result<()> {
        let writer = host.clone();
        host.register_event_handler(
            "awaiting-input",
            Box::new(move |event| {
                let _ = writer.write_pty(&event.session_id, b"yes\n");
            }),
        );
        Ok(())
    }
}

fn manifest(json: &str) -> PluginManifest {
    PluginManifest::from_json(json).unwrap()
}

#[tokio::test]
async fn test_watcher_sees_live_session_lines() {
    let (orchestrator, plugins) = test_orchestrator(4);
    let hits = Arc::new(AtomicUsize::new(0));
    plugins
        .register(
            manifest(r#"{"id": "build-watcher", "name": "Build Watcher", "version": "1.0.0"}"#),
            Box::new(BuildWatcher {
                hits: Arc::clone(&hits),
            }),
        )
        .unwrap();

    let id = orchestrator
        .spawn(sh("sleep 0.3; printf 'BUILD_DONE\\nBUILD_FAILED\\n'; sleep 0.2"))
        .unwrap();
    let mut rx = orchestrator.subscribe(&id).unwrap();
    collect_until_exit(&mut rx).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    orchestrator.shutdown();
}

#[tokio::test]
async fn test_capability_holding_plugin_answers_prompt() {
    let (orchestrator, plugins) = test_orchestrator(4);
    let sink: Weak<dyn PtySink> = Arc::downgrade(&(orchestrator.clone() as Arc<dyn PtySink>));
    plugins.set_pty_sink(sink);
    plugins
        .register(
            manifest(
                r#"{"id": "auto-confirm", "name": "Auto Confirm", "version": "1.0.0",
                    "capabilities": ["pty:write"]}"#,
            ),
            Box::new(AutoConfirm),
        )
        .unwrap();

    let id = orchestrator
        .spawn(sh(
            "sleep 0.3; printf 'Continue? [y/N]\\n'; read ans; printf 'answer:%s\\n' \"$ans\"; sleep 0.2",
        ))
        .unwrap();
    let mut rx = orchestrator.subscribe(&id).unwrap();

    let events = collect_until_exit(&mut rx).await;
    let output = String::from_utf8_lossy(&collected_output(&events)).into_owned();
    assert!(output.contains("answer:yes"), "output was: {output:?}");
    orchestrator.shutdown();
}

#[tokio::test]
async fn test_unregistered_plugin_sees_nothing() {
    let (orchestrator, plugins) = test_orchestrator(4);
    let hits = Arc::new(AtomicUsize::new(0));
    plugins
        .register(
            manifest(r#"{"id": "build-watcher", "name": "Build Watcher", "version": "1.0.0"}"#),
            Box::new(BuildWatcher {
                hits: Arc::clone(&hits),
            }),
        )
        .unwrap();
    plugins.unregister("build-watcher");

    let id = orchestrator
        .spawn(sh("sleep 0.3; printf 'BUILD_DONE\\n'; sleep 0.2"))
        .unwrap();
    let mut rx = orchestrator.subscribe(&id).unwrap();
    collect_until_exit(&mut rx).await;

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    orchestrator.shutdown();
}
