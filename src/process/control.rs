//! Platform-specific termination of timed-out children.

use crate::error::{AppError, Result};

/// Kill a child together with everything it spawned.
///
/// Children are started in their own process group on unix, so the whole
/// group goes down (Composer and npm both fork helpers). If the group cannot
/// be looked up the pid alone is signalled.
#[cfg(not(target_os = "windows"))]
pub fn force_kill_tree(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::{getpgid, Pid};

    let child = Pid::from_raw(pid as i32);
    let outcome = match getpgid(Some(child)) {
        Ok(group) => killpg(group, Signal::SIGKILL),
        Err(_) => kill(child, Signal::SIGKILL),
    };
    outcome.map_err(|errno| AppError::process(format!("Could not kill pid {}: {}", pid, errno)))
}

#[cfg(target_os = "windows")]
pub fn force_kill_tree(pid: u32) -> Result<()> {
    use std::os::windows::process::CommandExt as _;
    use windows::Win32::System::Threading::CREATE_NO_WINDOW;

    let output = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .creation_flags(CREATE_NO_WINDOW.0)
        .output()
        .map_err(|e| AppError::process(format!("Failed to run taskkill: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        Err(AppError::process(format!(
            "taskkill failed for pid {}: {}",
            pid,
            if detail.is_empty() {
                "(no output)"
            } else {
                detail
            }
        )))
    }
}

/// Exit code for a finished child; signal deaths map to 128 + signal.
pub fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
