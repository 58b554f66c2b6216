//! Integration tests for git worktree workspace provisioning and the
//! spawn-in-isolated-workspace path.

#![cfg(unix)]

mod common;

use std::fs;
use std::process::Command;

use tempfile::TempDir;

use common::{sh, test_orchestrator};
use termdock::git::WorktreeProvisioner;
use termdock::terminal::{CloseMode, SessionError, WorkspaceProvisioner, WorkspaceRequest};

/// Creates a temporary git repository with one commit for testing
fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let repo_path = temp_dir.path();

    Command::new("git")
        .args(["init"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to init git repo");
    Command::new("git")
        .args(["config", "user.email", "test@test.com"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to configure git email");
    Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to configure git name");

    fs::write(repo_path.join("test.txt"), "initial content\n").expect("Failed to write file");
    Command::new("git")
        .args(["add", "."])
        .current_dir(repo_path)
        .output()
        .expect("Failed to add files");
    Command::new("git")
        .args(["commit", "-m", "initial commit"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to commit");

    temp_dir
}

#[test]
fn test_provision_creates_worktree_checkout() {
    let repo = create_test_repo();
    let provisioner = WorktreeProvisioner::new();

    let path = provisioner
        .provision(repo.path(), "termdock/session-1")
        .expect("Failed to provision workspace");

    assert!(path.exists());
    assert!(path.starts_with(repo.path().join(".termdock").join("worktrees")));
    assert_eq!(
        fs::read_to_string(path.join("test.txt")).unwrap(),
        "initial content\n"
    );
}

#[test]
fn test_provision_suffixes_on_branch_collision() {
    let repo = create_test_repo();
    let provisioner = WorktreeProvisioner::new();

    let first = provisioner
        .provision(repo.path(), "termdock/session-1")
        .unwrap();
    let second = provisioner
        .provision(repo.path(), "termdock/session-1")
        .unwrap();

    assert_ne!(first, second);
    assert!(first.exists());
    assert!(second.exists());
}

#[test]
fn test_remove_cleans_up_worktree() {
    let repo = create_test_repo();
    let provisioner = WorktreeProvisioner::new();

    let path = provisioner
        .provision(repo.path(), "termdock/session-1")
        .unwrap();
    provisioner.remove(&path).expect("Failed to remove worktree");
    assert!(!path.exists());
}

#[test]
fn test_provision_outside_a_repository_fails() {
    let plain_dir = TempDir::new().unwrap();
    let provisioner = WorktreeProvisioner::new();
    assert!(provisioner
        .provision(plain_dir.path(), "termdock/session-1")
        .is_err());
}

#[test]
fn test_spawn_in_workspace_runs_in_the_worktree() {
    let repo = create_test_repo();
    let provisioner = WorktreeProvisioner::new();
    let (orchestrator, _plugins) = test_orchestrator(4);

    let request = WorkspaceRequest {
        base: repo.path().to_path_buf(),
        branch_name: "termdock/session-1".to_string(),
    };
    let id = orchestrator
        .spawn_in_workspace(sh("sleep 30"), &request, &provisioner)
        .expect("Failed to spawn in workspace");

    let info = orchestrator.info(&id).unwrap();
    assert!(info
        .cwd
        .starts_with(repo.path().join(".termdock").join("worktrees")));

    orchestrator.close(&id, CloseMode::Force).unwrap();
    orchestrator.shutdown();
}

#[test]
fn test_spawn_in_workspace_provisioning_failure_surfaces() {
    let plain_dir = TempDir::new().unwrap();
    let provisioner = WorktreeProvisioner::new();
    let (orchestrator, _plugins) = test_orchestrator(4);

    let request = WorkspaceRequest {
        base: plain_dir.path().to_path_buf(),
        branch_name: "termdock/session-1".to_string(),
    };
    let result = orchestrator.spawn_in_workspace(sh("sleep 1"), &request, &provisioner);
    assert!(matches!(result, Err(SessionError::SpawnFailed { .. })));
    assert!(orchestrator.list_active_sessions().is_empty());
    orchestrator.shutdown();
}
