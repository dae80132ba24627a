//! Update checks and in-place updates of installed packages.

use crate::locks::PackageLocks;
use crate::registry::PackageRegistry;
use crate::shared_folders::{LinkWarning, SharedFolders};
use chrono::Utc;
use matrix_core::{
    get_display_version, CancellationToken, InstalledPackage, LibraryPaths, MatrixError, ProgressSender, Result,
    SettingsStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a successful update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub updated: InstalledPackage,
    /// Shared folders that could not be re-linked.
    pub link_warnings: Vec<LinkWarning>,
}

/// Checks installed packages against their sources and updates them.
pub struct PackageUpdater {
    paths: LibraryPaths,
    settings: Arc<SettingsStore>,
    registry: Arc<PackageRegistry>,
    shared_folders: SharedFolders,
    locks: PackageLocks,
}

impl PackageUpdater {
    pub fn new(
        paths: LibraryPaths,
        settings: Arc<SettingsStore>,
        registry: Arc<PackageRegistry>,
        locks: PackageLocks,
    ) -> Self {
        Self {
            shared_folders: SharedFolders::new(paths.clone()),
            paths,
            settings,
            registry,
            locks,
        }
    }

    /// Ask the source whether `id` has a newer version and record the answer.
    pub async fn check_for_updates(&self, id: Uuid) -> Result<bool> {
        let package = self.installed(id)?;
        let descriptor = self.registry.require(&package.package_name)?;

        let available = descriptor.check_for_updates(&package).await?;
        self.settings
            .transaction(|settings| {
                let record = settings
                    .find_installed_mut(id)
                    .ok_or_else(|| not_found(id))?;
                record.update_available = available;
                record.last_update_check = Utc::now();
                Ok(())
            })
            .await?;

        info!(
            "{}: update {}",
            package.display_name,
            if available { "available" } else { "not available" }
        );
        Ok(available)
    }

    /// Install the newest version over `id`, keeping its identity and path.
    ///
    /// Files outside the new source tree stay in place; shared-folder links
    /// are checked again afterwards.
    pub async fn update(
        &self,
        id: Uuid,
        include_prerelease: bool,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome> {
        let package = self.installed(id)?;
        let descriptor = self.registry.require(&package.package_name)?;
        let _claim = self.locks.claim(descriptor.name(), "update")?;

        let install_dir = package.full_path(&self.paths);
        descriptor.set_install_location(install_dir.clone());
        let version = descriptor
            .update(&package, progress, include_prerelease, cancel)
            .await?;

        if let Err(e) = self.shared_folders.ensure_shared_folders() {
            warn!("Could not create shared folders: {}", e);
        }
        let link_warnings = self
            .shared_folders
            .setup_links_for_package(descriptor.as_ref(), &install_dir);

        let mut tx = cancel.run_until_cancelled(self.settings.begin_transaction()).await?;
        let record = tx
            .settings_mut()
            .find_installed_mut(id)
            .ok_or_else(|| not_found(id))?;
        record.display_version = get_display_version(&version, record.installed_branch.as_deref());
        record.package_version = version;
        record.last_update_check = Utc::now();
        record.update_available = false;
        let updated = record.clone();
        tx.commit().await?;

        info!("Updated {} to {}", updated.display_name, updated.display_version);
        Ok(UpdateOutcome { updated, link_warnings })
    }

    fn installed(&self, id: Uuid) -> Result<InstalledPackage> {
        self.settings
            .settings()
            .find_installed(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(id: Uuid) -> MatrixError {
    MatrixError::InstalledPackageNotFound { id: id.to_string() }
}
