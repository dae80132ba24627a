//! Settings store with all-or-nothing transactions.
//!
//! ## Usage
//!
//! ```ignore
//! let mut tx = store.begin_transaction().await;
//! tx.settings_mut().installed_packages.push(record);
//! tx.commit().await?;
//! // Dropping `tx` without committing discards every change.
//! ```

use super::atomic::{atomic_read_json, atomic_write_json};
use crate::models::InstalledPackage;
use crate::{MatrixError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Process-wide settings persisted as `settings.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub installed_packages: Vec<InstalledPackage>,
    #[serde(default)]
    pub active_installed_package: Option<Uuid>,
}

impl Settings {
    pub fn find_installed(&self, id: Uuid) -> Option<&InstalledPackage> {
        self.installed_packages.iter().find(|p| p.id == id)
    }

    pub fn find_installed_mut(&mut self, id: Uuid) -> Option<&mut InstalledPackage> {
        self.installed_packages.iter_mut().find(|p| p.id == id)
    }

    /// The installed package currently marked active, if it still exists.
    pub fn active_package(&self) -> Option<&InstalledPackage> {
        self.active_installed_package
            .and_then(|id| self.find_installed(id))
    }

    /// Whether any installed package lives at `Packages/<install_name>`.
    pub fn has_install_name(&self, install_name: &str) -> bool {
        self.installed_packages
            .iter()
            .any(|p| p.has_install_name(install_name))
    }
}

/// Owner of the committed [`Settings`] and its backing file.
///
/// Transactions are serialised; readers only see committed state.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    committed: RwLock<Settings>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Load settings from `path`, starting empty when the file is absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings: Settings = atomic_read_json(&path)?.unwrap_or_default();
        debug!(
            "Loaded settings from {} ({} installed packages)",
            path.display(),
            settings.installed_packages.len()
        );
        Ok(Self {
            path,
            committed: RwLock::new(settings),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the committed settings.
    pub fn settings(&self) -> Settings {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start a transaction on a working copy of the committed settings.
    ///
    /// Waits for any other open transaction to finish.
    pub async fn begin_transaction(&self) -> SettingsTransaction<'_> {
        let guard = self.write_lock.lock().await;
        SettingsTransaction {
            store: self,
            _guard: guard,
            working: self.settings(),
            committed: false,
        }
    }

    /// Run `f` inside a transaction; commit on `Ok`, roll back on `Err`.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Settings) -> Result<T>,
    {
        let mut tx = self.begin_transaction().await;
        let value = f(tx.settings_mut())?;
        tx.commit().await?;
        Ok(value)
    }

    fn publish(&self, settings: Settings) {
        *self
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

/// An open settings transaction.
///
/// Holds the store's write lock until committed, rolled back or dropped.
pub struct SettingsTransaction<'a> {
    store: &'a SettingsStore,
    _guard: MutexGuard<'a, ()>,
    working: Settings,
    committed: bool,
}

impl SettingsTransaction<'_> {
    pub fn settings(&self) -> &Settings {
        &self.working
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.working
    }

    /// Persist the working copy and publish it to readers.
    ///
    /// On failure nothing is published and the committed state is unchanged.
    pub async fn commit(mut self) -> Result<()> {
        let path = self.store.path.clone();
        let snapshot = self.working.clone();
        tokio::task::spawn_blocking(move || atomic_write_json(&path, &snapshot, true))
            .await
            .map_err(|e| MatrixError::Persistence {
                message: format!("Settings writer task failed: {}", e),
            })?
            .map_err(|e| MatrixError::Persistence {
                message: e.to_string(),
            })?;

        self.store.publish(std::mem::take(&mut self.working));
        self.committed = true;
        info!("Committed settings to {}", self.store.path.display());
        Ok(())
    }

    /// Discard the working copy.
    pub fn rollback(self) {}
}

impl Drop for SettingsTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("Settings transaction rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryPaths;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(name: &str) -> InstalledPackage {
        InstalledPackage {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            library_path: LibraryPaths::relative_install_path(name),
            package_name: "ComfyUI".to_string(),
            package_version: "v0.1.0".to_string(),
            display_version: "v0.1.0".to_string(),
            installed_branch: None,
            launch_command: "main.py".to_string(),
            launch_args: Vec::new(),
            last_update_check: Utc::now(),
            update_available: false,
        }
    }

    #[tokio::test]
    async fn test_commit_persists_and_publishes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        let store = SettingsStore::open(&path).unwrap();

        let package = record("comfy");
        let mut tx = store.begin_transaction().await;
        tx.settings_mut().installed_packages.push(package.clone());
        tx.settings_mut().active_installed_package = Some(package.id);
        tx.commit().await.unwrap();

        assert_eq!(store.settings().installed_packages.len(), 1);
        assert_eq!(store.settings().active_package().unwrap().id, package.id);

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.settings(), store.settings());
    }

    #[tokio::test]
    async fn test_readers_see_only_committed_state() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::open(temp.path().join("settings.json")).unwrap();

        let mut tx = store.begin_transaction().await;
        tx.settings_mut().installed_packages.push(record("a"));
        assert!(store.settings().installed_packages.is_empty());
        tx.rollback();

        assert!(store.settings().installed_packages.is_empty());
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::open(temp.path().join("settings.json")).unwrap();
        {
            let mut tx = store.begin_transaction().await;
            tx.settings_mut().installed_packages.push(record("a"));
        }
        assert!(store.settings().installed_packages.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_closure_transaction_rolls_back_on_error() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::open(temp.path().join("settings.json")).unwrap();

        let result: Result<()> = store
            .transaction(|settings| {
                settings.installed_packages.push(record("a"));
                Err(MatrixError::Other("abort".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(store.settings().installed_packages.is_empty());

        let id = store
            .transaction(|settings| {
                let package = record("b");
                let id = package.id;
                settings.installed_packages.push(package);
                Ok(id)
            })
            .await
            .unwrap();
        assert!(store.settings().find_installed(id).is_some());
        assert!(store.settings().has_install_name("b"));
    }

    #[tokio::test]
    async fn test_failed_write_is_persistence_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        let store = SettingsStore::open(&path).unwrap();
        // A directory in place of the file makes the final rename fail.
        std::fs::create_dir(&path).unwrap();

        let mut tx = store.begin_transaction().await;
        tx.settings_mut().installed_packages.push(record("a"));
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, MatrixError::Persistence { .. }));
        assert!(store.settings().installed_packages.is_empty());
    }
}
