//! Centralized configuration for the Matrix launcher.
//!
//! Compile-time constants for network operations, installation and the
//! on-disk library layout, plus [`LibraryPaths`] which resolves every
//! directory the launcher touches from a single library root.

use crate::{MatrixError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Matrix";
    pub const USER_AGENT: &'static str = "Matrix-Launcher/0.3";
    /// Directory name under the platform data dir when no library is given.
    pub const DEFAULT_LIBRARY_DIR_NAME: &'static str = "StabilityMatrix";
    pub const LIBRARY_DIR_ENV: &'static str = "MATRIX_LIBRARY_DIR";
    pub const GITHUB_TOKEN_ENV: &'static str = "GITHUB_TOKEN";
}

/// Configuration for installation process.
pub struct InstallationConfig;

impl InstallationConfig {
    // Package manager timeouts
    pub const PIP_INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);
    pub const VENV_CREATION_TIMEOUT: Duration = Duration::from_secs(120);

    // Subprocess timeouts
    pub const SUBPROCESS_QUICK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const SUBPROCESS_STOP_TIMEOUT: Duration = Duration::from_secs(5);

    /// Length of the abbreviated commit hash shown in display versions.
    pub const SHORT_SHA_LEN: usize = 7;

    /// Number of commits requested per page when listing a branch.
    pub const COMMITS_PER_PAGE: u32 = 10;

    /// Minimal git distribution unpacked into `Assets/PortableGit` on Windows.
    pub const PORTABLE_GIT_URL: &'static str =
        "https://github.com/git-for-windows/git/releases/download/v2.41.0.windows.1/MinGit-2.41.0-64-bit.zip";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_WEB_BASE: &'static str = "https://github.com";
    pub const GITHUB_PER_PAGE: u32 = 100;
    pub const GITHUB_MAX_PAGES: u32 = 10;
    pub const GITHUB_CACHE_TTL: Duration = Duration::from_secs(900);
    /// Concurrent head-commit lookups when listing branches.
    pub const BRANCH_LOOKUP_CONCURRENCY: usize = 4;
    /// Branches whose head commit message is fetched per listing; the rest
    /// carry no release notes.
    pub const BRANCH_HEAD_LOOKUPS: usize = 8;
}

/// Directory and file names inside the library root.
pub struct PathsConfig;

impl PathsConfig {
    pub const PACKAGES_DIR_NAME: &'static str = "Packages";
    pub const MODELS_DIR_NAME: &'static str = "Models";
    pub const ASSETS_DIR_NAME: &'static str = "Assets";
    pub const LOGS_DIR_NAME: &'static str = "Logs";
    pub const SETTINGS_FILE_NAME: &'static str = "settings.json";
    pub const VENV_DIR_NAME: &'static str = "venv";
    pub const PORTABLE_GIT_DIR_NAME: &'static str = "PortableGit";
}

/// Resolved filesystem layout of a package library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    root: PathBuf,
}

impl LibraryPaths {
    /// Use `root` as the library directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the library root from an explicit path, the
    /// `MATRIX_LIBRARY_DIR` environment variable, or the platform data dir.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }
        if let Some(root) = std::env::var_os(AppConfig::LIBRARY_DIR_ENV) {
            return Ok(Self::new(root));
        }
        let data_dir = dirs::data_dir().ok_or_else(|| MatrixError::Config {
            message: "Could not determine the platform data directory".to_string(),
        })?;
        Ok(Self::new(data_dir.join(AppConfig::DEFAULT_LIBRARY_DIR_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/Packages`
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::PACKAGES_DIR_NAME)
    }

    /// `<root>/Models`, the shared-resource directory.
    pub fn models_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::MODELS_DIR_NAME)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::ASSETS_DIR_NAME)
    }

    /// `<root>/Assets/PortableGit`
    pub fn portable_git_dir(&self) -> PathBuf {
        self.assets_dir().join(PathsConfig::PORTABLE_GIT_DIR_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::LOGS_DIR_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(PathsConfig::SETTINGS_FILE_NAME)
    }

    /// Path stored in an installed-package record, relative to the root.
    pub fn relative_install_path(install_name: &str) -> PathBuf {
        Path::new(PathsConfig::PACKAGES_DIR_NAME).join(install_name)
    }

    /// `<root>/Packages/<install_name>`
    pub fn install_dir(&self, install_name: &str) -> PathBuf {
        self.root.join(Self::relative_install_path(install_name))
    }

    /// `<root>/Packages/<package_name>.zip`
    pub fn download_archive(&self, package_name: &str) -> PathBuf {
        self.packages_dir().join(format!("{}.zip", package_name))
    }

    /// Create the directories every install expects.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.packages_dir(), self.models_dir(), self.assets_dir(), self.logs_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| MatrixError::io_with_path(e, &dir))?;
        }
        Ok(())
    }
}
