//! Foreground process introspection.
//!
//! Used by UI heuristics ("is an agent still running in this terminal?").
//! Everything here is best-effort: any failure degrades to `None`.

use portable_pty::MasterPty;

use crate::domain::ProcessInfo;

/// Query the process currently holding the terminal's foreground process
/// group.
#[cfg(unix)]
pub(crate) fn foreground_process(master: &dyn MasterPty) -> Option<ProcessInfo> {
    let fd = master.as_raw_fd()?;
    let pgrp = unsafe { libc::tcgetpgrp(fd) };
    let pid = if pgrp > 0 {
        pgrp
    } else {
        master.process_group_leader()?
    };
    if pid <= 0 {
        return None;
    }
    Some(ProcessInfo {
        pid: pid as u32,
        name: process_name(pid as u32),
    })
}

#[cfg(not(unix))]
pub(crate) fn foreground_process(_master: &dyn MasterPty) -> Option<ProcessInfo> {
    None
}

/// Resolve a pid to a process name where the platform exposes one.
#[cfg(target_os = "linux")]
fn process_name(pid: u32) -> Option<String> {
    std::fs::read_to_string(format!("/proc/{pid}/comm"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_name(pid: u32) -> Option<String> {
    // `ps` is the portable fallback on macOS and the BSDs.
    let output = std::process::Command::new("ps")
        .args(["-o", "comm=", "-p", &pid.to_string()])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Send SIGTERM to a process so it can exit cleanly before a forced kill.
#[cfg(unix)]
pub(crate) fn terminate(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    rc == 0
}

#[cfg(not(unix))]
pub(crate) fn terminate(_pid: u32) -> bool {
    false
}
