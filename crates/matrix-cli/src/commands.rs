//! Subcommand implementations.

use crate::progress::{follow_install, follow_reports};
use anyhow::{anyhow, Context, Result};
use matrix_core::{get_display_version, CancellationToken, InstallationConfig, LibraryPaths, SettingsStore};
use matrix_packages::installer::{InstallOrchestrator, InstallRequest, VersionSelector};
use matrix_packages::package::{PackageContext, PackageDescriptor, PackageEvent};
use matrix_packages::{PackageLauncher, PackageLocks, PackageRegistry, PackageUpdater, SystemPrerequisites};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};
use uuid::Uuid;

pub struct App {
    paths: LibraryPaths,
    context: PackageContext,
    registry: Arc<PackageRegistry>,
    settings: Arc<SettingsStore>,
    locks: PackageLocks,
}

impl App {
    pub fn new(paths: LibraryPaths, github_token: Option<String>) -> Result<Self> {
        let context = PackageContext::new(paths.clone(), github_token)?;
        let registry = Arc::new(PackageRegistry::with_default_catalog(&context)?);
        let settings = Arc::new(
            SettingsStore::open(paths.settings_file())
                .with_context(|| format!("Failed to load {}", paths.settings_file().display()))?,
        );
        Ok(Self {
            paths,
            context,
            registry,
            settings,
            locks: PackageLocks::new(),
        })
    }

    fn package(&self, name: &str) -> Result<Arc<dyn PackageDescriptor>> {
        self.registry.find_by_name(Some(name)).ok_or_else(|| {
            let known: Vec<&str> = self.registry.list_all().iter().map(|p| p.name()).collect();
            anyhow!("Unknown package '{}' (available: {})", name, known.join(", "))
        })
    }

    pub fn list(&self, as_json: bool) -> Result<()> {
        if as_json {
            let packages: Vec<_> = self
                .registry
                .list_all()
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name(),
                        "displayName": p.display_name(),
                        "author": p.author(),
                        "blurb": p.blurb(),
                        "githubUrl": p.github_url(),
                        "ignoresReleases": p.should_ignore_releases(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&packages)?);
            return Ok(());
        }

        for package in self.registry.list_all() {
            println!("{:<24} {} ({})", package.name(), package.display_name(), package.by_author());
            println!("{:<24} {}", "", package.blurb());
        }
        Ok(())
    }

    pub async fn versions(&self, name: &str, branches: bool) -> Result<()> {
        let package = self.package(name)?;
        if !branches && package.should_ignore_releases() {
            warn!("{} does not publish releases, listing branches", package.name());
        }
        let use_releases = !branches && !package.should_ignore_releases();
        for version in package.get_all_versions(use_releases).await? {
            let summary = version
                .release_notes
                .as_deref()
                .and_then(|n| n.lines().next())
                .unwrap_or_default();
            println!("{:<24} {}", version.tag_name, summary);
        }
        Ok(())
    }

    pub async fn commits(&self, name: &str, branch: &str, page: u32) -> Result<()> {
        let package = self.package(name)?;
        match package
            .get_all_commits(branch, page, InstallationConfig::COMMITS_PER_PAGE)
            .await?
        {
            None => println!("No history available for {}", branch),
            Some(commits) if commits.is_empty() => println!("No commits on {}", branch),
            Some(commits) => {
                for commit in commits {
                    println!("{}  {}", commit.short_sha(), commit.label);
                }
            }
        }
        Ok(())
    }

    pub async fn install(
        &self,
        name: &str,
        install_name: Option<String>,
        version: Option<String>,
        branch: Option<String>,
        commit: Option<String>,
    ) -> Result<()> {
        let package = self.package(name)?;

        let mut selector = VersionSelector::new(Arc::clone(&package));
        if branch.is_some() && selector.is_release_mode() {
            selector.set_release_mode(false).await?;
        } else {
            selector.load().await?;
        }
        if let Some(tag) = version.as_deref().or(branch.as_deref()) {
            selector.select_version(tag).await?;
        }
        if let Some(sha) = commit.as_deref() {
            selector.select_commit(sha)?;
        }
        let choice = selector
            .choice()
            .ok_or_else(|| anyhow!("No installable version found for {}", package.name()))?;

        let orchestrator = InstallOrchestrator::new(
            self.paths.clone(),
            Arc::clone(&self.settings),
            Arc::new(SystemPrerequisites::new(
                self.paths.clone(),
                Arc::clone(&self.context.downloads),
            )),
            self.locks.clone(),
        );
        let request = InstallRequest {
            descriptor: package,
            install_name: install_name.unwrap_or_else(|| name.to_string()),
            version: choice,
        };

        let cancel = cancel_on_ctrl_c();
        let bar = follow_install(orchestrator.subscribe());
        let result = orchestrator.install(request, &cancel).await;
        drop(orchestrator);
        bar.await.ok();

        let outcome = result?;
        for warning in &outcome.link_warnings {
            warn!("Shared folder not linked: {}", warning);
        }
        println!(
            "Installed {} {} at {} (id {})",
            outcome.installed.package_name,
            outcome.installed.display_version,
            outcome.installed.full_path(&self.paths).display(),
            outcome.installed.id
        );
        Ok(())
    }

    pub fn installed(&self, as_json: bool) -> Result<()> {
        let settings = self.settings.settings();
        if as_json {
            println!("{}", serde_json::to_string_pretty(&settings.installed_packages)?);
            return Ok(());
        }
        if settings.installed_packages.is_empty() {
            println!("No packages installed in {}", self.paths.root().display());
            return Ok(());
        }
        for package in &settings.installed_packages {
            let active = if settings.active_installed_package == Some(package.id) {
                "*"
            } else {
                " "
            };
            let update = if package.update_available { " (update available)" } else { "" };
            println!(
                "{} {}  {:<20} {:<24} {}{}",
                active, package.id, package.display_name, package.package_name, package.display_version, update
            );
        }
        Ok(())
    }

    pub async fn check_updates(&self, id: Option<Uuid>) -> Result<()> {
        let updater = self.updater();
        let ids: Vec<Uuid> = match id {
            Some(id) => vec![id],
            None => self.settings.settings().installed_packages.iter().map(|p| p.id).collect(),
        };

        for id in ids {
            match updater.check_for_updates(id).await {
                Ok(true) => println!("{}: update available", id),
                Ok(false) => println!("{}: up to date", id),
                Err(e) => warn!("Update check for {} failed: {}", id, e),
            }
        }
        Ok(())
    }

    pub async fn update(&self, id: Uuid, include_prerelease: bool) -> Result<()> {
        let cancel = cancel_on_ctrl_c();
        let (tx, rx) = mpsc::channel(64);
        let bar = follow_reports(rx);
        let result = self.updater().update(id, include_prerelease, Some(&tx), &cancel).await;
        drop(tx);
        bar.await.ok();

        let outcome = result?;
        for warning in &outcome.link_warnings {
            warn!("Shared folder not linked: {}", warning);
        }
        let updated = outcome.updated;
        println!(
            "Updated {} to {}",
            updated.display_name,
            get_display_version(&updated.package_version, updated.installed_branch.as_deref())
        );
        Ok(())
    }

    pub async fn launch(&self, id: Uuid) -> Result<()> {
        let launcher = PackageLauncher::new(
            self.paths.clone(),
            Arc::clone(&self.settings),
            Arc::clone(&self.registry),
            self.locks.clone(),
        );

        let exited = Arc::new(Notify::new());
        let on_exit = Arc::clone(&exited);
        let _subscription = launcher
            .launch(
                id,
                Some(Arc::new(move |event: &PackageEvent| match event {
                    PackageEvent::ConsoleOutput(output) if output.is_stderr => eprintln!("{}", output.text),
                    PackageEvent::ConsoleOutput(output) => println!("{}", output.text),
                    PackageEvent::StartupComplete(url) => info!("Package is ready at {}", url),
                    PackageEvent::Exited(code) => {
                        info!("Package exited with code {}", code);
                        on_exit.notify_one();
                    }
                })),
            )
            .await?;

        tokio::select! {
            _ = exited.notified() => {}
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Stopping package");
                launcher.stop(id).await?;
            }
        }
        Ok(())
    }

    fn updater(&self) -> PackageUpdater {
        PackageUpdater::new(
            self.paths.clone(),
            Arc::clone(&self.settings),
            Arc::clone(&self.registry),
            self.locks.clone(),
        )
    }
}

/// Token cancelled on the first Ctrl+C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancelling...");
            token.cancel();
        }
    });
    cancel
}
