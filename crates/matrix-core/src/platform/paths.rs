//! Interpreter and virtual environment paths.

use crate::config::PathsConfig;
use std::path::{Path, PathBuf};

/// Name of the system Python interpreter on `PATH`.
///
/// # Platform Behavior
/// - **Windows**: `python`
/// - **Others**: `python3`
pub fn system_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Directory holding the virtual environment's executables.
///
/// # Platform Behavior
/// - **Linux/macOS**: `{base}/venv/bin`
/// - **Windows**: `{base}/venv/Scripts`
pub fn venv_bin_dir(base: &Path) -> PathBuf {
    let venv = base.join(PathsConfig::VENV_DIR_NAME);
    if cfg!(windows) {
        venv.join("Scripts")
    } else {
        venv.join("bin")
    }
}

/// Python executable inside the package's virtual environment.
pub fn venv_python(base: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_bin_dir(base).join("python.exe")
    } else {
        venv_bin_dir(base).join("python")
    }
}
