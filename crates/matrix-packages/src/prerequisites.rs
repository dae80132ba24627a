//! Tools every package install needs: git, pip and virtual environments.

use async_trait::async_trait;
use matrix_core::archive::extract_package_archive;
use matrix_core::models::report;
use matrix_core::platform::{supports_portable_git, system_python};
use matrix_core::{
    CancellationToken, DownloadService, InstallationConfig, LibraryPaths, MatrixError, ProcessRunner,
    ProgressReport, ProgressSender, ProgressType, Result,
};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// Verifies and provisions install prerequisites.
///
/// Progress reports carry free-text messages; consumers that want a stage
/// label inspect the message, kind and title.
#[async_trait]
pub trait PrerequisiteHelper: Send + Sync {
    async fn install_git_if_necessary(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken)
        -> Result<()>;

    async fn ensure_pip(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken) -> Result<()>;

    async fn ensure_virtualenv(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken) -> Result<()>;

    /// Run every check in order: git, pip, virtualenv.
    async fn ensure_all(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken) -> Result<()> {
        self.install_git_if_necessary(progress, cancel).await?;
        cancel.check()?;
        self.ensure_pip(progress, cancel).await?;
        cancel.check()?;
        self.ensure_virtualenv(progress, cancel).await
    }
}

/// Prerequisites resolved against the host system.
pub struct SystemPrerequisites {
    paths: LibraryPaths,
    downloads: Arc<DownloadService>,
}

impl SystemPrerequisites {
    pub fn new(paths: LibraryPaths, downloads: Arc<DownloadService>) -> Self {
        Self { paths, downloads }
    }

    fn portable_git(&self) -> PathBuf {
        let bin = self.paths.portable_git_dir().join("cmd");
        if cfg!(windows) {
            bin.join("git.exe")
        } else {
            bin.join("git")
        }
    }

    async fn git_available(&self) -> bool {
        self.portable_git().is_file() || command_succeeds("git", &["--version"]).await
    }

    async fn install_portable_git(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken) -> Result<()> {
        let archive = self.paths.assets_dir().join("PortableGit.zip");
        self.downloads
            .download(InstallationConfig::PORTABLE_GIT_URL, &archive, progress, cancel)
            .await
            .map_err(|e| prerequisite_error("git", e))?;

        report(progress, ProgressReport::new(0.0, ProgressType::Extract).with_message("Extracting git")).await;
        let target = self.paths.portable_git_dir();
        let source = archive.clone();
        tokio::task::spawn_blocking(move || extract_package_archive(&source, &target))
            .await
            .map_err(|e| MatrixError::Prerequisite {
                name: "git".to_string(),
                message: e.to_string(),
            })?
            .map_err(|e| prerequisite_error("git", e))?;
        report(progress, ProgressReport::new(1.0, ProgressType::Extract).with_message("Extracting git")).await;

        let _ = tokio::fs::remove_file(&archive).await;
        info!("Installed portable git into {}", self.paths.portable_git_dir().display());
        Ok(())
    }

    async fn python_module(&self, args: &[&str], name: &str, cancel: &CancellationToken) -> Result<()> {
        let mut command = Command::new(system_python());
        command.args(args);
        ProcessRunner::run_to_completion(command, name, InstallationConfig::PIP_INSTALL_TIMEOUT, cancel, |line| {
            debug!("{}", line.text)
        })
        .await
        .map_err(|e| prerequisite_error(name, e))
    }
}

#[async_trait]
impl PrerequisiteHelper for SystemPrerequisites {
    async fn install_git_if_necessary(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken)
        -> Result<()> {
        if self.git_available().await {
            debug!("git is available");
            return Ok(());
        }
        if !supports_portable_git() {
            return Err(MatrixError::Prerequisite {
                name: "git".to_string(),
                message: "git was not found on PATH; install it with the system package manager".to_string(),
            });
        }
        self.install_portable_git(progress, cancel).await
    }

    async fn ensure_pip(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken) -> Result<()> {
        if command_succeeds(system_python(), &["-m", "pip", "--version"]).await {
            return Ok(());
        }
        report(
            progress,
            ProgressReport::indeterminate(ProgressType::Generic)
                .with_title("Unpacking resources")
                .with_message("Setting up pip"),
        )
        .await;
        self.python_module(&["-m", "ensurepip", "--upgrade"], "pip", cancel).await
    }

    async fn ensure_virtualenv(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken) -> Result<()> {
        if venv_module_usable().await {
            return Ok(());
        }
        report(
            progress,
            ProgressReport::indeterminate(ProgressType::Generic).with_message("Installing virtualenv"),
        )
        .await;
        self.python_module(&["-m", "pip", "install", "virtualenv"], "virtualenv", cancel)
            .await
    }
}

/// Whether the interpreter ships the standard `venv` module.
pub(crate) async fn venv_module_usable() -> bool {
    command_succeeds(system_python(), &["-m", "venv", "--help"]).await
}

/// Modules to try, in order, for `python -m <module> <dir>`.
///
/// `virtualenv` is the fallback installed by
/// [`PrerequisiteHelper::ensure_virtualenv`] when `venv` is missing; it is
/// also tried when `venv` exists but fails (distributions that split out
/// `ensurepip`).
pub(crate) fn venv_modules(venv_usable: bool) -> &'static [&'static str] {
    if venv_usable {
        &["venv", "virtualenv"]
    } else {
        &["virtualenv"]
    }
}

/// Whether `program args` runs and exits successfully within the quick timeout.
async fn command_succeeds(program: &str, args: &[&str]) -> bool {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    matches!(
        tokio::time::timeout(InstallationConfig::SUBPROCESS_QUICK_TIMEOUT, status).await,
        Ok(Ok(status)) if status.success()
    )
}

fn prerequisite_error(name: &str, e: MatrixError) -> MatrixError {
    match e {
        MatrixError::Cancelled | MatrixError::Prerequisite { .. } => e,
        other => MatrixError::Prerequisite {
            name: name.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::ErrorKind;

    #[tokio::test]
    async fn test_command_succeeds() {
        assert!(!command_succeeds("/definitely/not/a/program", &[]).await);
        #[cfg(unix)]
        {
            assert!(command_succeeds("sh", &["-c", "exit 0"]).await);
            assert!(!command_succeeds("sh", &["-c", "exit 1"]).await);
        }
    }

    #[test]
    fn test_venv_modules_fall_back_to_virtualenv() {
        assert_eq!(venv_modules(true), ["venv", "virtualenv"]);
        assert_eq!(venv_modules(false), ["virtualenv"]);
    }

    #[test]
    fn test_prerequisite_error_mapping() {
        let mapped = prerequisite_error("pip", MatrixError::Other("boom".into()));
        assert_eq!(mapped.kind(), ErrorKind::Prerequisite);
        assert_eq!(prerequisite_error("pip", MatrixError::Cancelled).kind(), ErrorKind::Cancelled);
    }
}
