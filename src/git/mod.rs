//! Git worktree provisioning for isolated session workspaces

mod workspace;

pub use workspace::{find_git_root, WorktreeProvisioner};
