//! Worktree-backed workspace provisioning.
//!
//! Implements the orchestrator's [`WorkspaceProvisioner`] seam with `git
//! worktree add`: each isolated session gets its own checkout on a fresh
//! branch under `<repo>/.termdock/worktrees/`. Branch and directory name
//! collisions are resolved by suffixing, with bounded retries.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use crate::terminal::WorkspaceProvisioner;

/// Suffix attempts before giving up on a colliding branch name.
const MAX_NAME_RETRIES: u32 = 10;

/// Find the git repository root for a given path.
/// Returns None if the path is not inside a git repository.
pub fn find_git_root(path: &Path) -> Option<PathBuf> {
    let start_dir = if path.is_file() { path.parent()? } else { path };

    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(start_dir)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        None
    } else {
        Some(PathBuf::from(root))
    }
}

/// Provisions isolated workspaces as git worktrees.
#[derive(Debug, Clone, Default)]
pub struct WorktreeProvisioner;

impl WorktreeProvisioner {
    pub fn new() -> Self {
        Self
    }

    fn create(&self, base: &Path, branch_name: &str) -> Result<PathBuf> {
        let root = find_git_root(base)
            .ok_or_else(|| anyhow!("Not a git repository: {}", base.display()))?;

        if !has_commits(&root) {
            bail!(
                "Cannot create worktree: repository has no commits. \
                Please make an initial commit first."
            );
        }

        let worktrees_dir = root.join(".termdock").join("worktrees");
        std::fs::create_dir_all(&worktrees_dir)?;

        for attempt in 0..=MAX_NAME_RETRIES {
            let branch = if attempt == 0 {
                branch_name.to_string()
            } else {
                format!("{}-{}", branch_name, attempt)
            };
            // Branch names can contain '/', directory names cannot.
            let dir_name = branch.replace('/', "-");
            let worktree_path = worktrees_dir.join(&dir_name);

            if worktree_path.exists() {
                continue;
            }

            let output = Command::new("git")
                .args(["branch", &branch])
                .current_dir(&root)
                .output()
                .context("Failed to create branch")?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.contains("already exists") {
                    continue;
                }
                bail!("Failed to create branch: {}", stderr);
            }

            let worktree_path_str = worktree_path
                .to_str()
                .ok_or_else(|| anyhow!("Worktree path contains invalid UTF-8"))?;

            let output = Command::new("git")
                .args(["worktree", "add", worktree_path_str, &branch])
                .current_dir(&root)
                .output()
                .context("Failed to create worktree")?;

            if output.status.success() {
                info!(path = %worktree_path.display(), branch = %branch, "worktree created");
                return Ok(worktree_path);
            }

            let stderr = String::from_utf8_lossy(&output.stderr);

            // The branch we just created is useless without its worktree
            let _ = Command::new("git")
                .args(["branch", "-D", &branch])
                .current_dir(&root)
                .output();

            if stderr.contains("already exists") || stderr.contains("is already checked out") {
                continue;
            }

            bail!("Failed to create worktree: {}", stderr);
        }

        bail!(
            "Failed to create worktree for branch {} after {} retries - all suffixes in use",
            branch_name,
            MAX_NAME_RETRIES
        );
    }

    /// Remove a provisioned worktree and its branch. Used by callers
    /// rolling back after a spawn failure, and for ordinary cleanup.
    pub fn remove(&self, worktree_path: &Path) -> Result<()> {
        let root = find_git_root(worktree_path)
            .ok_or_else(|| anyhow!("Not a git repository: {}", worktree_path.display()))?;

        let branch = current_branch(worktree_path)?;

        let output = Command::new("git")
            .args([
                "worktree",
                "remove",
                "--force",
                &worktree_path.to_string_lossy(),
            ])
            .current_dir(&root)
            .output()
            .context("Failed to remove worktree")?;

        if !output.status.success() {
            bail!(
                "Failed to remove worktree: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let _ = Command::new("git")
            .args(["branch", "-D", &branch])
            .current_dir(&root)
            .output();

        Ok(())
    }
}

impl WorkspaceProvisioner for WorktreeProvisioner {
    fn provision(&self, base: &Path, branch_name: &str) -> Result<PathBuf> {
        self.create(base, branch_name)
    }
}

/// Check if the repository has at least one commit
fn has_commits(root: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(root)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn current_branch(path: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(path)
        .output()
        .context("Failed to get current branch")?;

    if !output.status.success() {
        bail!(
            "Failed to get current branch: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
