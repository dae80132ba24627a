//! Graceful process termination.

use tracing::debug;

/// Ask process `pid` to exit.
///
/// # Platform Behavior
/// - **Unix**: sends `SIGTERM`
/// - **Others**: no graceful signal exists; returns `false` so the caller
///   falls back to a hard kill
pub fn request_graceful_stop(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        debug!("Sending SIGTERM to process {}", pid);
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => true,
            Err(nix::errno::Errno::ESRCH) => true,
            Err(e) => {
                tracing::warn!("Failed to send SIGTERM to {}: {}", pid, e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    {
        debug!("No graceful stop for process {} on this platform", pid);
        false
    }
}
