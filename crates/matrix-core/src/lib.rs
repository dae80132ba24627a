//! Matrix Core - headless building blocks for the Matrix package launcher.
//!
//! This crate owns everything that is not specific to a particular package:
//! the error taxonomy, library layout, settings persistence, GitHub access,
//! downloads, archive extraction, directory links and child processes.
//!
//! Package descriptors and the install flow live in `matrix-packages`.
//!
//! # Example
//!
//! ```rust,ignore
//! use matrix_core::{LibraryPaths, SettingsStore};
//!
//! let paths = LibraryPaths::resolve(None)?;
//! let store = SettingsStore::open(paths.settings_file())?;
//! for package in store.settings().installed_packages {
//!     println!("{} ({})", package.display_name, package.display_version);
//! }
//! ```

pub mod archive;
pub mod cancel;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod platform;
pub mod process;
pub mod settings;

pub use cancel::{CancellationToken, CancelledError};
pub use config::{AppConfig, InstallationConfig, LibraryPaths, NetworkConfig, PathsConfig};
pub use error::{ErrorKind, MatrixError, Result};
pub use models::{
    get_display_version, GitCommit, InstalledPackage, LaunchOption, LaunchOptionDefinition,
    LaunchOptionType, PackageVersion, ProgressReport, ProgressSender, ProgressType,
    SharedFolderType,
};
pub use network::{DownloadService, GitHubClient};
pub use process::{ProcessEvent, ProcessHandle, ProcessOutput, ProcessRunner};
pub use settings::{Settings, SettingsStore, SettingsTransaction};
