//! Shared model folders linked into each installed package.
//!
//! Models live once under `<Library>/Models/<Folder>`; each package gets a
//! directory link at the relative path its descriptor declares.

use crate::package::PackageDescriptor;
use matrix_core::platform::link_dir;
use matrix_core::{LibraryPaths, MatrixError, Result, SharedFolderType};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A shared folder that could not be linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkWarning {
    pub folder: SharedFolderType,
    pub target: PathBuf,
    pub message: String,
}

impl fmt::Display for LinkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {}",
            self.folder.dir_name(),
            self.target.display(),
            self.message
        )
    }
}

/// Manages `<Library>/Models` and the links into packages.
#[derive(Debug, Clone)]
pub struct SharedFolders {
    paths: LibraryPaths,
}

impl SharedFolders {
    pub fn new(paths: LibraryPaths) -> Self {
        Self { paths }
    }

    /// `<Library>/Models/<Folder>`
    pub fn folder_path(&self, folder: SharedFolderType) -> PathBuf {
        self.paths.models_dir().join(folder.dir_name())
    }

    /// Create every shared folder.
    pub fn ensure_shared_folders(&self) -> Result<()> {
        for folder in SharedFolderType::ALL {
            let path = self.folder_path(folder);
            std::fs::create_dir_all(&path).map_err(|e| MatrixError::io_with_path(e, &path))?;
        }
        Ok(())
    }

    /// Link every folder `descriptor` declares into `install_dir`.
    ///
    /// Best-effort: each failure is logged and returned, never raised.
    pub fn setup_links_for_package(&self, descriptor: &dyn PackageDescriptor, install_dir: &Path) -> Vec<LinkWarning> {
        let Some(folders) = descriptor.shared_folders() else {
            return Vec::new();
        };

        let mut warnings = Vec::new();
        for (folder, relative) in folders {
            let source = self.folder_path(*folder);
            let target = install_dir.join(relative);
            if let Err(e) = link_dir(&source, &target) {
                warn!("Could not link shared folder {}: {}", folder.dir_name(), e);
                warnings.push(LinkWarning {
                    folder: *folder,
                    target,
                    message: e.to_string(),
                });
            }
        }

        info!(
            "Linked {} of {} shared folders for {}",
            folders.len() - warnings.len(),
            folders.len(),
            descriptor.name()
        );
        warnings
    }
}
