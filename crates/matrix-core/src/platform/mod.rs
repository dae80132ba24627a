//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here:
//! - `paths` - interpreter and virtual environment locations
//! - `links` - directory links for shared model folders
//! - `signal` - graceful process termination

pub mod links;
pub mod paths;
pub mod signal;

pub use links::{link_dir, LinkOutcome};
pub use paths::{system_python, venv_bin_dir, venv_python};
pub use signal::request_graceful_stop;

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    std::env::consts::OS
}

/// Whether missing prerequisites can be provisioned automatically.
///
/// Portable git is only published for Windows; elsewhere the user installs
/// git through the system package manager.
pub fn supports_portable_git() -> bool {
    cfg!(windows)
}
