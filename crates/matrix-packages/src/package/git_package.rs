//! Descriptor for packages distributed as GitHub repositories.
//!
//! Every catalog entry is a [`GitPackage`] configured by a
//! [`PackageDefinition`]: releases and branches come from the GitHub API,
//! source archives are unpacked into the install location, and the package
//! runs from its own virtual environment.

use super::{PackageContext, PackageDescriptor, PackageEvent, PackageEvents, SharedFolderMap};
use crate::installer::default_branch;
use crate::prerequisites::{venv_module_usable, venv_modules};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use matrix_core::archive::extract_package_archive;
use matrix_core::models::{report, GitHubBranch, GitHubRelease, GitHubRepo};
use matrix_core::platform::{system_python, venv_python};
use matrix_core::process::ProcessEventHandler;
use matrix_core::{
    CancellationToken, GitCommit, InstallationConfig, InstalledPackage, LaunchOptionDefinition, MatrixError,
    NetworkConfig, PackageVersion, PathsConfig, ProcessEvent, ProcessHandle, ProcessOutput, ProcessRunner,
    ProgressReport, ProgressSender, ProgressType, Result,
};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Static description of a GitHub-hosted package.
#[derive(Debug, Clone)]
pub struct PackageDefinition {
    pub name: &'static str,
    pub display_name: &'static str,
    pub author: &'static str,
    pub blurb: &'static str,
    pub github_url: &'static str,
    pub launch_command: &'static str,
    pub preview_image_url: &'static str,
    /// Requirements file installed after `pre_install`, relative to the root.
    pub requirements_file: &'static str,
    /// `pip install` argument lists run before the requirements file.
    pub pre_install: &'static [&'static [&'static str]],
    /// Log line announcing the web UI; capture group 1 is the URL.
    pub startup_pattern: &'static str,
    pub ignore_releases: bool,
    pub launch_options: Vec<LaunchOptionDefinition>,
    pub shared_folders: Option<SharedFolderMap>,
}

#[derive(Debug)]
struct MutableState {
    display_name: String,
    install_location: Option<PathBuf>,
    update_available: bool,
}

/// A package installed from a GitHub repository.
pub struct GitPackage {
    definition: PackageDefinition,
    repo: GitHubRepo,
    startup_pattern: Regex,
    ctx: PackageContext,
    state: RwLock<MutableState>,
    events: PackageEvents,
    running: Mutex<Option<ProcessHandle>>,
}

impl GitPackage {
    pub fn new(definition: PackageDefinition, ctx: PackageContext) -> Result<Self> {
        let repo = GitHubRepo::from_url(definition.github_url).ok_or_else(|| MatrixError::Config {
            message: format!("Not a GitHub repository URL: {}", definition.github_url),
        })?;
        let startup_pattern = Regex::new(definition.startup_pattern).map_err(|e| MatrixError::Config {
            message: format!("Invalid startup pattern for {}: {}", definition.name, e),
        })?;

        Ok(Self {
            state: RwLock::new(MutableState {
                display_name: definition.display_name.to_string(),
                install_location: None,
                update_available: false,
            }),
            definition,
            repo,
            startup_pattern,
            ctx,
            events: PackageEvents::new(),
            running: Mutex::new(None),
        })
    }

    pub fn repo(&self) -> &GitHubRepo {
        &self.repo
    }

    /// Head commit SHA of `branch`.
    async fn branch_head(&self, branch: &str) -> Result<String> {
        let branches = self.ctx.github.get_branches(&self.repo).await?;
        branches
            .into_iter()
            .find(|b| b.name == branch)
            .map(|b| b.commit.sha)
            .ok_or_else(|| MatrixError::InvalidVersion {
                version: branch.to_string(),
            })
    }

    /// Forwards child output to console subscribers.
    fn console_forwarder(&self) -> impl Fn(ProcessOutput) + Send + Sync + 'static {
        let events = self.events.clone();
        move |line| events.emit(&PackageEvent::ConsoleOutput(line))
    }

    fn require_install_location(&self) -> Result<PathBuf> {
        self.install_location().ok_or_else(|| MatrixError::InstallStep {
            message: format!("No install location set for {}", self.definition.name),
        })
    }

    async fn run_step(&self, command: Command, label: &str, timeout: Duration, cancel: &CancellationToken) -> Result<()> {
        ProcessRunner::run_to_completion(command, label, timeout, cancel, self.console_forwarder()).await
    }

    async fn ensure_venv(&self, location: &Path, cancel: &CancellationToken) -> Result<()> {
        if venv_python(location).exists() {
            debug!("Reusing virtual environment in {}", location.display());
            return Ok(());
        }

        let mut last_error = None;
        for &module in venv_modules(venv_module_usable().await) {
            let mut command = Command::new(system_python());
            command
                .args(["-m", module, PathsConfig::VENV_DIR_NAME])
                .current_dir(location);
            match self
                .run_step(command, module, InstallationConfig::VENV_CREATION_TIMEOUT, cancel)
                .await
            {
                Ok(()) => return Ok(()),
                Err(MatrixError::Cancelled) => return Err(MatrixError::Cancelled),
                Err(e) => {
                    warn!("python -m {} failed: {}", module, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| MatrixError::Prerequisite {
            name: "virtualenv".to_string(),
            message: "no virtual environment module available".to_string(),
        }))
    }

    async fn pip_install(&self, location: &Path, args: &[&str], cancel: &CancellationToken) -> Result<()> {
        let mut command = Command::new(venv_python(location));
        command
            .args(["-m", "pip", "install"])
            .args(args)
            .current_dir(location);
        self.run_step(command, "pip install", InstallationConfig::PIP_INSTALL_TIMEOUT, cancel)
            .await
    }

    fn handle_process_event(&self) -> ProcessEventHandler {
        let events = self.events.clone();
        let pattern = self.startup_pattern.clone();
        let started = Arc::new(AtomicBool::new(false));

        Arc::new(move |event| match event {
            ProcessEvent::Output(output) => {
                let url = if started.load(Ordering::SeqCst) {
                    None
                } else {
                    pattern
                        .captures(&output.text)
                        .and_then(|c| c.get(1))
                        .map(|m| m.as_str().to_string())
                };
                events.emit(&PackageEvent::ConsoleOutput(output));
                if let Some(url) = url {
                    if !started.swap(true, Ordering::SeqCst) {
                        events.emit(&PackageEvent::StartupComplete(url));
                    }
                }
            }
            ProcessEvent::Exited(code) => events.emit(&PackageEvent::Exited(code)),
        })
    }

    fn read_state<T>(&self, f: impl FnOnce(&MutableState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write_state(&self, f: impl FnOnce(&mut MutableState)) {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl PackageDescriptor for GitPackage {
    fn name(&self) -> &str {
        self.definition.name
    }

    fn display_name(&self) -> String {
        self.read_state(|s| s.display_name.clone())
    }

    fn set_display_name(&self, display_name: &str) {
        self.write_state(|s| s.display_name = display_name.to_string());
    }

    fn author(&self) -> &str {
        self.definition.author
    }

    fn blurb(&self) -> &str {
        self.definition.blurb
    }

    fn github_url(&self) -> &str {
        self.definition.github_url
    }

    fn launch_command(&self) -> &str {
        self.definition.launch_command
    }

    fn preview_image_url(&self) -> &str {
        self.definition.preview_image_url
    }

    fn launch_options(&self) -> &[LaunchOptionDefinition] {
        &self.definition.launch_options
    }

    fn shared_folders(&self) -> Option<&SharedFolderMap> {
        self.definition.shared_folders.as_ref()
    }

    fn should_ignore_releases(&self) -> bool {
        self.definition.ignore_releases
    }

    fn download_location(&self) -> PathBuf {
        self.ctx.paths.download_archive(self.definition.name)
    }

    fn install_location(&self) -> Option<PathBuf> {
        self.read_state(|s| s.install_location.clone())
    }

    fn set_install_location(&self, location: PathBuf) {
        self.write_state(|s| s.install_location = Some(location));
    }

    fn update_available(&self) -> bool {
        self.read_state(|s| s.update_available)
    }

    fn set_update_available(&self, available: bool) {
        self.write_state(|s| s.update_available = available);
    }

    fn events(&self) -> &PackageEvents {
        &self.events
    }

    async fn get_all_versions(&self, use_releases: bool) -> Result<Vec<PackageVersion>> {
        if use_releases {
            let releases = self.get_all_releases().await?;
            return Ok(releases
                .into_iter()
                .filter(|r| !r.draft)
                .map(|r| PackageVersion::new(r.tag_name, r.body))
                .collect());
        }

        let branches = self.get_all_branches().await?;
        let wanted = head_lookup_targets(&branches, NetworkConfig::BRANCH_HEAD_LOOKUPS);
        let rate_limited = AtomicBool::new(false);
        let (github, repo, wanted, rate_limited) = (&self.ctx.github, &self.repo, &wanted, &rate_limited);

        let versions: Vec<PackageVersion> = stream::iter(branches)
            .map(|branch| async move {
                if !wanted.contains(&branch.name) || rate_limited.load(Ordering::SeqCst) {
                    return PackageVersion::new(branch.name, None);
                }
                let notes = match github.get_commit(repo, &branch.commit.sha).await {
                    Ok(commit) => Some(commit.commit.message),
                    Err(e) => {
                        if matches!(e, MatrixError::RateLimited { .. }) {
                            rate_limited.store(true, Ordering::SeqCst);
                        }
                        warn!("Could not fetch head commit of {}: {}", branch.name, e);
                        None
                    }
                };
                PackageVersion::new(branch.name, notes)
            })
            .buffered(NetworkConfig::BRANCH_LOOKUP_CONCURRENCY)
            .collect()
            .await;
        Ok(versions)
    }

    async fn get_all_branches(&self) -> Result<Vec<GitHubBranch>> {
        self.ctx.github.get_branches(&self.repo).await
    }

    async fn get_all_releases(&self) -> Result<Vec<GitHubRelease>> {
        self.ctx.github.get_releases(&self.repo).await
    }

    async fn get_latest_version(&self) -> Result<String> {
        if self.should_ignore_releases() {
            let branches = self.get_all_branches().await?;
            let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
            let branch = default_branch(&names).ok_or_else(|| MatrixError::InvalidVersion {
                version: "default branch".to_string(),
            })?;
            return self.branch_head(branch).await;
        }

        self.ctx
            .github
            .get_latest_release(&self.repo, false)
            .await?
            .map(|r| r.tag_name)
            .ok_or_else(|| MatrixError::InvalidVersion {
                version: "latest release".to_string(),
            })
    }

    async fn get_all_commits(&self, branch: &str, page: u32, per_page: u32) -> Result<Option<Vec<GitCommit>>> {
        match self.ctx.github.get_commits(&self.repo, branch, page, per_page).await {
            Ok(commits) => Ok(Some(
                commits
                    .iter()
                    .map(|c| GitCommit {
                        sha: c.sha.clone(),
                        label: c.summary().to_string(),
                    })
                    .collect(),
            )),
            Err(e) => {
                warn!("Could not list commits of {}@{}: {}", self.repo, branch, e);
                Ok(None)
            }
        }
    }

    async fn download_package(
        &self,
        version: &str,
        is_commit_hash: bool,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let url = if is_commit_hash {
            self.ctx.github.commit_archive_url(&self.repo, version)
        } else {
            self.ctx.github.release_archive_url(&self.repo, version)
        };
        let destination = self.download_location();
        info!("Downloading {} {} from {}", self.definition.name, version, url);

        match self.ctx.downloads.download(&url, &destination, progress, cancel).await {
            Ok(_) => Ok(destination),
            Err(e) if matches!(e.status_code(), Some(404) | Some(422)) => Err(MatrixError::InvalidVersion {
                version: version.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn install_package(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken) -> Result<()> {
        let location = self.require_install_location()?;
        let archive = self.download_location();
        if !archive.is_file() {
            return Err(MatrixError::InstallStep {
                message: format!("Downloaded archive not found at {}", archive.display()),
            });
        }

        cancel.check()?;
        report(
            progress,
            ProgressReport::indeterminate(ProgressType::Extract).with_message("Extracting package..."),
        )
        .await;
        let (from, to) = (archive.clone(), location.clone());
        tokio::task::spawn_blocking(move || extract_package_archive(&from, &to))
            .await
            .map_err(|e| MatrixError::InstallStep {
                message: format!("Extraction task failed: {}", e),
            })?
            .map_err(as_install_step)?;

        cancel.check()?;
        report(
            progress,
            ProgressReport::indeterminate(ProgressType::Generic).with_message("Creating virtual environment..."),
        )
        .await;
        self.ensure_venv(&location, cancel).await.map_err(as_install_step)?;

        report(
            progress,
            ProgressReport::indeterminate(ProgressType::Generic).with_message("Installing requirements..."),
        )
        .await;
        for args in self.definition.pre_install {
            self.pip_install(&location, args, cancel).await.map_err(as_install_step)?;
        }
        let requirements = location.join(self.definition.requirements_file);
        if requirements.is_file() {
            let requirements = requirements.to_string_lossy().into_owned();
            self.pip_install(&location, &["-r", &requirements], cancel)
                .await
                .map_err(as_install_step)?;
        } else {
            info!("No {} found, skipping requirements", self.definition.requirements_file);
        }

        report(
            progress,
            ProgressReport::new(1.0, ProgressType::Generic).with_message("Installation complete"),
        )
        .await;
        info!("Installed {} into {}", self.definition.name, location.display());
        Ok(())
    }

    async fn run_package(&self, install_path: &Path, arguments: &[String]) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(MatrixError::LaunchFailed {
                package: self.definition.name.to_string(),
                message: "already running".to_string(),
            });
        }

        let python = venv_python(install_path);
        if !python.exists() {
            return Err(MatrixError::LaunchFailed {
                package: self.definition.name.to_string(),
                message: format!("virtual environment missing at {}", python.display()),
            });
        }

        let mut command = Command::new(python);
        command
            .arg(self.definition.launch_command)
            .args(arguments)
            .current_dir(install_path);

        let handle = ProcessRunner::spawn(command, self.definition.name, self.handle_process_event())?;
        *running = Some(handle);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(handle) = self.running.lock().await.take() else {
            debug!("{} is not running", self.definition.name);
            return Ok(());
        };
        handle.stop(InstallationConfig::SUBPROCESS_STOP_TIMEOUT).await?;
        Ok(())
    }

    async fn check_for_updates(&self, package: &InstalledPackage) -> Result<bool> {
        self.ctx.github.invalidate_cache(&self.repo);
        let available = match &package.installed_branch {
            Some(branch) => self.branch_head(branch).await? != package.package_version,
            None => match self.ctx.github.get_latest_release(&self.repo, false).await? {
                Some(latest) => is_newer_version(&latest.tag_name, &package.package_version),
                None => false,
            },
        };
        self.set_update_available(available);
        Ok(available)
    }

    async fn update(
        &self,
        package: &InstalledPackage,
        progress: Option<&ProgressSender>,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (version, is_commit) = match &package.installed_branch {
            Some(branch) => (self.branch_head(branch).await?, true),
            None => {
                let release = self
                    .ctx
                    .github
                    .get_latest_release(&self.repo, include_prerelease)
                    .await?
                    .ok_or_else(|| MatrixError::InvalidVersion {
                        version: "latest release".to_string(),
                    })?;
                (release.tag_name, false)
            }
        };

        info!("Updating {} from {} to {}", package.display_name, package.package_version, version);
        self.download_package(&version, is_commit, progress, cancel).await?;
        self.install_package(progress, cancel).await?;
        self.set_update_available(false);
        Ok(version)
    }
}

/// Branches whose head commit message is fetched: the default branch, then
/// the first others in listing order, `limit` in total.
fn head_lookup_targets(branches: &[GitHubBranch], limit: usize) -> HashSet<String> {
    let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
    default_branch(&names)
        .into_iter()
        .chain(names.iter().copied())
        .map(str::to_string)
        .fold(HashSet::new(), |mut targets, name| {
            if targets.len() < limit {
                targets.insert(name);
            }
            targets
        })
}

/// Keep cancellation and install-step errors; everything else is an install step failure.
fn as_install_step(e: MatrixError) -> MatrixError {
    match e {
        MatrixError::Cancelled | MatrixError::InstallStep { .. } => e,
        other => MatrixError::InstallStep {
            message: other.to_string(),
        },
    }
}

/// Whether `latest` is newer than `current`.
///
/// Tags are compared as semver (a leading `v` is ignored) when both parse;
/// otherwise any difference counts as newer.
pub(crate) fn is_newer_version(latest: &str, current: &str) -> bool {
    let parse = |tag: &str| semver::Version::parse(tag.trim_start_matches(['v', 'V']));
    match (parse(latest), parse(current)) {
        (Ok(latest), Ok(current)) => latest > current,
        _ => latest != current,
    }
}
