//! Install flow: prerequisites, download, install, shared folders, commit.
//!
//! Progress from every stage arrives over an `mpsc` channel and is folded
//! into a single [`InstallerState`] published on a `watch` channel.

use super::selection::VersionChoice;
use super::state::{InstallStage, InstallerState};
use crate::locks::PackageLocks;
use crate::package::PackageDescriptor;
use crate::prerequisites::PrerequisiteHelper;
use crate::shared_folders::{LinkWarning, SharedFolders};
use chrono::Utc;
use matrix_core::{
    get_display_version, CancellationToken, InstalledPackage, LibraryPaths, MatrixError, ProgressReport,
    ProgressSender, ProgressType, Result, SettingsStore,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// One install attempt.
#[derive(Clone)]
pub struct InstallRequest {
    pub descriptor: Arc<dyn PackageDescriptor>,
    /// Directory name under `Packages/`.
    pub install_name: String,
    pub version: VersionChoice,
}

/// Result of a successful install.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub installed: InstalledPackage,
    /// Shared folders that could not be linked.
    pub link_warnings: Vec<LinkWarning>,
}

/// Drives a descriptor through the install stages and records the result.
pub struct InstallOrchestrator {
    paths: LibraryPaths,
    settings: Arc<SettingsStore>,
    prerequisites: Arc<dyn PrerequisiteHelper>,
    shared_folders: SharedFolders,
    state: Arc<watch::Sender<InstallerState>>,
    locks: PackageLocks,
}

impl InstallOrchestrator {
    /// `locks` must be the set shared with the updater and launcher.
    pub fn new(
        paths: LibraryPaths,
        settings: Arc<SettingsStore>,
        prerequisites: Arc<dyn PrerequisiteHelper>,
        locks: PackageLocks,
    ) -> Self {
        let (state, _) = watch::channel(InstallerState::default());
        let state = Arc::new(state);
        Self {
            shared_folders: SharedFolders::new(paths.clone()),
            paths,
            settings,
            prerequisites,
            state,
            locks,
        }
    }

    /// Receive every published [`InstallerState`].
    pub fn subscribe(&self) -> watch::Receiver<InstallerState> {
        self.state.subscribe()
    }

    /// Latest published state.
    pub fn state(&self) -> InstallerState {
        self.state.borrow().clone()
    }

    /// Install `request.descriptor` at `Packages/<install_name>`.
    ///
    /// Validation failures return before any state is published. Every later
    /// failure, including cancellation, leaves the state `Failed` with the
    /// progress reset.
    pub async fn install(&self, request: InstallRequest, cancel: &CancellationToken) -> Result<InstallOutcome> {
        let install_name = validate_install_name(&request.install_name)?;
        let descriptor = Arc::clone(&request.descriptor);
        let _claim = self.locks.claim(descriptor.name(), "install")?;

        let duplicate = self.settings.settings().has_install_name(&install_name);
        if duplicate {
            warn!("Install name '{}' is already used by an installed package", install_name);
        }
        self.state.send_replace(InstallerState {
            duplicate_warning: duplicate,
            ..InstallerState::default()
        });

        info!(
            "Installing {} {} as '{}'",
            descriptor.name(),
            request.version.version(),
            install_name
        );

        match self.run_stages(&descriptor, &install_name, &request.version, cancel).await {
            Ok(outcome) => {
                self.state.send_modify(|s| {
                    s.stage = InstallStage::Done;
                    s.value = 100.0;
                    s.is_indeterminate = false;
                    s.text = "Installation complete".to_string();
                });
                info!("Installed {} as '{}'", descriptor.name(), install_name);
                Ok(outcome)
            }
            Err(e) => {
                self.state.send_modify(|s| {
                    s.stage = InstallStage::Failed;
                    s.value = 0.0;
                    s.is_indeterminate = false;
                    s.text = "Installation failed".to_string();
                });
                error!("Install of {} as '{}' failed: {}", descriptor.name(), install_name, e);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        descriptor: &Arc<dyn PackageDescriptor>,
        install_name: &str,
        version: &VersionChoice,
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome> {
        self.paths.ensure_directories()?;

        cancel.check()?;
        self.enter_stage(InstallStage::EnsuringPrerequisites, "Checking prerequisites...");
        let prerequisites = Arc::clone(&self.prerequisites);
        self.with_progress(
            |tx| async move { prerequisites.ensure_all(Some(&tx), cancel).await },
            prerequisite_label,
        )
        .await?;

        let install_dir = self.paths.install_dir(install_name);
        descriptor.set_install_location(install_dir.clone());

        cancel.check()?;
        self.enter_stage(
            InstallStage::Downloading,
            format!("Downloading {} {}...", descriptor.display_name(), version.version()),
        );
        let downloader = Arc::clone(descriptor);
        let archive = self
            .with_progress(
                |tx| async move {
                    downloader
                        .download_package(version.version(), version.is_commit(), Some(&tx), cancel)
                        .await
                },
                message_label,
            )
            .await?;
        debug!("Downloaded {} to {}", descriptor.name(), archive.display());

        cancel.check()?;
        self.enter_stage(InstallStage::Installing, "Installing package...");
        let sink = Arc::clone(&self.state);
        let console = descriptor.events().subscribe_console(move |output| {
            let line = output.text.clone();
            sink.send_modify(|s| s.description = line);
        });
        let installer = Arc::clone(descriptor);
        let installed = self
            .with_progress(
                |tx| async move { installer.install_package(Some(&tx), cancel).await },
                message_label,
            )
            .await;
        console.unsubscribe();
        installed?;

        cancel.check()?;
        self.enter_stage(InstallStage::LinkingSharedFolders, "Linking shared folders...");
        let link_warnings = self.link_shared_folders(descriptor.as_ref(), &install_dir);

        cancel.check()?;
        self.enter_stage(InstallStage::Committing, "Saving installed package...");
        let record = new_record(descriptor.as_ref(), install_name, version);
        let mut tx = cancel.run_until_cancelled(self.settings.begin_transaction()).await?;
        tx.settings_mut().installed_packages.push(record.clone());
        tx.settings_mut().active_installed_package = Some(record.id);
        tx.commit().await?;

        Ok(InstallOutcome {
            installed: record,
            link_warnings,
        })
    }

    fn link_shared_folders(&self, descriptor: &dyn PackageDescriptor, install_dir: &Path) -> Vec<LinkWarning> {
        if let Err(e) = self.shared_folders.ensure_shared_folders() {
            warn!("Could not create shared folders: {}", e);
        }
        self.shared_folders.setup_links_for_package(descriptor, install_dir)
    }

    fn enter_stage(&self, stage: InstallStage, text: impl Into<String>) {
        let text = text.into();
        info!("Install stage {:?}: {}", stage, text);
        self.state.send_modify(|s| {
            s.stage = stage;
            s.value = 0.0;
            s.is_indeterminate = true;
            s.text = text;
        });
    }

    /// Run `op` while folding the reports it sends into the published state.
    async fn with_progress<T, F, Fut>(&self, op: F, label: fn(&ProgressReport) -> String) -> Result<T>
    where
        F: FnOnce(ProgressSender) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (tx, mut rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let fut = op(tx);
        tokio::pin!(fut);

        let result = loop {
            tokio::select! {
                result = &mut fut => break result,
                Some(report) = rx.recv() => self.apply_progress(&report, label),
            }
        };
        while let Ok(report) = rx.try_recv() {
            self.apply_progress(&report, label);
        }
        result
    }

    fn apply_progress(&self, report: &ProgressReport, label: fn(&ProgressReport) -> String) {
        let text = label(report);
        self.state.send_modify(|s| {
            s.value = report.percentage();
            s.is_indeterminate = report.is_indeterminate;
            if !text.is_empty() {
                s.text = text;
            }
        });
    }
}

/// Trim `install_name` and reject names that are empty or leave `Packages/`.
pub fn validate_install_name(install_name: &str) -> Result<String> {
    let name = install_name.trim();
    if name.is_empty() {
        return Err(MatrixError::validation("install_name", "Install name must not be empty"));
    }
    if name.contains(['/', '\\']) {
        return Err(MatrixError::validation(
            "install_name",
            format!("'{}' must not contain path separators", name),
        ));
    }
    if name.contains("..") || name == "." {
        return Err(MatrixError::validation(
            "install_name",
            format!("'{}' is not a valid directory name", name),
        ));
    }
    Ok(name.to_string())
}

fn new_record(descriptor: &dyn PackageDescriptor, install_name: &str, version: &VersionChoice) -> InstalledPackage {
    InstalledPackage {
        id: Uuid::new_v4(),
        display_name: install_name.to_string(),
        library_path: LibraryPaths::relative_install_path(install_name),
        package_name: descriptor.name().to_string(),
        package_version: version.version().to_string(),
        display_version: get_display_version(version.version(), version.branch()),
        installed_branch: version.branch().map(str::to_string),
        launch_command: descriptor.launch_command().to_string(),
        launch_args: Vec::new(),
        last_update_check: Utc::now(),
        update_available: false,
    }
}

/// Stage text for a prerequisite report.
fn prerequisite_label(report: &ProgressReport) -> String {
    let percent = report.percentage();
    let message = report.message.as_deref().unwrap_or_default();
    if message.contains("Downloading") {
        format!("Downloading prerequisites... {:.0}%", percent)
    } else if report.kind == ProgressType::Extract {
        format!("Installing git... {:.0}%", percent)
    } else if report.title.as_deref().is_some_and(|t| t.contains("Unpacking")) {
        format!("Unpacking resources... {:.0}%", percent)
    } else {
        message.to_string()
    }
}

fn message_label(report: &ProgressReport) -> String {
    report.message.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_install_name() {
        assert_eq!(validate_install_name("  webui  ").unwrap(), "webui");
        assert!(validate_install_name("").is_err());
        assert!(validate_install_name("   ").is_err());
        assert!(validate_install_name("a/b").is_err());
        assert!(validate_install_name("a\\b").is_err());
        assert!(validate_install_name("..").is_err());
        assert!(validate_install_name(".").is_err());
        assert!(validate_install_name("a..b").is_err());
        assert_eq!(validate_install_name("webui-2").unwrap(), "webui-2");
    }

    #[test]
    fn test_validation_error_kind() {
        let err = validate_install_name("").unwrap_err();
        assert_eq!(err.kind(), matrix_core::ErrorKind::Validation);
    }

    #[test]
    fn test_prerequisite_labels() {
        let download = ProgressReport::new(0.5, ProgressType::Download).with_message("Downloading git");
        assert_eq!(prerequisite_label(&download), "Downloading prerequisites... 50%");

        let extract = ProgressReport::new(0.25, ProgressType::Extract).with_message("Extracting git");
        assert_eq!(prerequisite_label(&extract), "Installing git... 25%");

        let unpack = ProgressReport::new(1.0, ProgressType::Generic)
            .with_title("Unpacking resources")
            .with_message("get-pip.py");
        assert_eq!(prerequisite_label(&unpack), "Unpacking resources... 100%");

        let other = ProgressReport::indeterminate(ProgressType::Generic).with_message("Checking virtualenv");
        assert_eq!(prerequisite_label(&other), "Checking virtualenv");
    }
}
