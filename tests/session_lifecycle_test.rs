//! Integration tests for the session control plane: capacity, close
//! semantics, and the not-found contract for stale session ids.

#![cfg(unix)]

mod common;

use common::{collect_until_exit, collected_output, sh, test_orchestrator};
use termdock::terminal::{CloseMode, SessionError};
use termdock::SessionId;

#[test]
fn test_spawn_and_natural_exit() {
    let (orchestrator, _plugins) = test_orchestrator(4);
    let id = orchestrator.spawn(sh("exit 0")).unwrap();
    assert!(id.as_str().starts_with("term-"));

    // The session disappears from the registry on its own once the child
    // exits; poll rather than sleep a fixed amount.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while orchestrator.list_active_sessions().contains(&id) {
        assert!(std::time::Instant::now() < deadline, "session never exited");
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    orchestrator.shutdown();
}

#[test]
fn test_close_then_operations_return_not_found() {
    let (orchestrator, _plugins) = test_orchestrator(4);
    let id = orchestrator.spawn(sh("sleep 30")).unwrap();

    orchestrator.close(&id, CloseMode::Force).unwrap();

    assert!(matches!(
        orchestrator.write(&id, b"hello"),
        Err(SessionError::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.resize(&id, 40, 100),
        Err(SessionError::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.pause(&id),
        Err(SessionError::SessionNotFound(_))
    ));
    assert!(orchestrator.query_foreground_process(&id).is_none());

    // Closing twice is not an error
    orchestrator.close(&id, CloseMode::Force).unwrap();
    orchestrator.close(&id, CloseMode::Graceful).unwrap();
    orchestrator.shutdown();
}

#[test]
fn test_operations_on_unknown_id() {
    let (orchestrator, _plugins) = test_orchestrator(4);
    let id = SessionId::from("term-never-existed");

    assert!(matches!(
        orchestrator.write(&id, b"x"),
        Err(SessionError::SessionNotFound(_))
    ));
    orchestrator.close(&id, CloseMode::Force).unwrap();
    orchestrator.shutdown();
}

#[test]
fn test_capacity_cap_enforced() {
    let (orchestrator, _plugins) = test_orchestrator(1);
    let first = orchestrator.spawn(sh("sleep 30")).unwrap();

    match orchestrator.spawn(sh("sleep 30")) {
        Err(SessionError::CapacityExceeded { active, max }) => {
            assert_eq!(active, 1);
            assert_eq!(max, 1);
        }
        other => panic!("expected CapacityExceeded, got {other:?}"),
    }

    let stats = orchestrator.get_stats();
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.max_sessions, 1);

    // A close frees the slot for the next spawn
    orchestrator.close(&first, CloseMode::Force).unwrap();
    let second = orchestrator.spawn(sh("sleep 30")).unwrap();
    orchestrator.close(&second, CloseMode::Force).unwrap();
    orchestrator.shutdown();
}

#[tokio::test]
async fn test_exit_notification_carries_code_and_fires_once() {
    let (orchestrator, _plugins) = test_orchestrator(4);
    let id = orchestrator.spawn(sh("sleep 0.3; exit 7")).unwrap();
    let mut rx = orchestrator.subscribe(&id).unwrap();

    let events = collect_until_exit(&mut rx).await;
    let exits: Vec<i32> = events
        .iter()
        .filter_map(|e| match e {
            termdock::terminal::SessionEvent::Exit(code) => Some(*code),
            _ => None,
        })
        .collect();
    assert_eq!(exits, vec![7]);
    orchestrator.shutdown();
}

#[tokio::test]
async fn test_write_reaches_the_child() {
    let (orchestrator, _plugins) = test_orchestrator(4);
    let id = orchestrator
        .spawn(sh("sleep 0.3; read line; printf 'got:%s\\n' \"$line\"; sleep 0.2"))
        .unwrap();
    let mut rx = orchestrator.subscribe(&id).unwrap();

    orchestrator.write(&id, b"hello\n").unwrap();

    let events = collect_until_exit(&mut rx).await;
    let output = String::from_utf8_lossy(&collected_output(&events)).into_owned();
    assert!(output.contains("got:hello"), "output was: {output:?}");
    orchestrator.shutdown();
}

#[tokio::test]
async fn test_resize_does_not_disturb_buffered_output() {
    let (orchestrator, _plugins) = test_orchestrator(4);
    let id = orchestrator
        .spawn(sh("sleep 0.3; printf 'alpha beta gamma'; sleep 30"))
        .unwrap();

    // Wait for the output to land in the ring
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    loop {
        let snapshot = orchestrator.scrollback(&id).unwrap();
        if String::from_utf8_lossy(&snapshot).contains("alpha beta gamma") {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "output never arrived");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    orchestrator.resize(&id, 50, 200).unwrap();
    let info = orchestrator.info(&id).unwrap();
    assert_eq!((info.rows, info.cols), (50, 200));

    let snapshot = orchestrator.scrollback(&id).unwrap();
    assert!(String::from_utf8_lossy(&snapshot).contains("alpha beta gamma"));

    orchestrator.close(&id, CloseMode::Force).unwrap();
    orchestrator.shutdown();
}
