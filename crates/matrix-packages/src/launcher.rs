//! Starting and stopping installed packages.

use crate::locks::PackageLocks;
use crate::package::{PackageEventHandler, Subscription};
use crate::registry::PackageRegistry;
use matrix_core::{InstalledPackage, LibraryPaths, MatrixError, Result, SettingsStore};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct PackageLauncher {
    paths: LibraryPaths,
    settings: Arc<SettingsStore>,
    registry: Arc<PackageRegistry>,
    locks: PackageLocks,
}

impl PackageLauncher {
    pub fn new(
        paths: LibraryPaths,
        settings: Arc<SettingsStore>,
        registry: Arc<PackageRegistry>,
        locks: PackageLocks,
    ) -> Self {
        Self {
            paths,
            settings,
            registry,
            locks,
        }
    }

    /// Run installed package `id` with its saved launch options.
    ///
    /// `handler` is registered before the process starts and stays registered
    /// while the returned guard lives. Fails while an install or update of the
    /// same package is running.
    pub async fn launch(&self, id: Uuid, handler: Option<PackageEventHandler>) -> Result<Option<Subscription>> {
        let package = self.installed(id)?;
        let descriptor = self.registry.require(&package.package_name)?;
        let install_path = package.full_path(&self.paths);
        let arguments = package.launch_arguments();

        let claim = self.locks.claim(descriptor.name(), "launch")?;
        let subscription = handler.map(|h| descriptor.events().subscribe(h));
        descriptor.set_install_location(install_path.clone());
        descriptor.run_package(&install_path, &arguments).await?;
        drop(claim);

        info!(
            "Launched {} ({}) with [{}]",
            package.display_name,
            descriptor.name(),
            arguments.join(" ")
        );
        Ok(subscription)
    }

    /// Stop installed package `id` if it is running.
    pub async fn stop(&self, id: Uuid) -> Result<()> {
        let package = self.installed(id)?;
        self.registry.require(&package.package_name)?.shutdown().await
    }

    fn installed(&self, id: Uuid) -> Result<InstalledPackage> {
        self.settings
            .settings()
            .find_installed(id)
            .cloned()
            .ok_or_else(|| MatrixError::InstalledPackageNotFound { id: id.to_string() })
    }
}
