//! Package descriptors.
//!
//! A [`PackageDescriptor`] describes one installable package type and knows
//! how to list its versions, download, install, run and update it. The
//! catalog is built once at startup; see [`crate::registry`].

mod a1111;
mod comfyui;
mod events;
mod git_package;

pub use a1111::automatic1111;
pub use comfyui::comfyui;
pub use events::{PackageEvent, PackageEventHandler, PackageEvents, Subscription};
pub use git_package::{GitPackage, PackageDefinition};

use async_trait::async_trait;
use matrix_core::models::{GitHubBranch, GitHubRelease};
use matrix_core::{
    CancellationToken, DownloadService, GitCommit, GitHubClient, InstalledPackage, LaunchOptionDefinition,
    LibraryPaths, PackageVersion, ProgressSender, Result, SharedFolderType,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared folder type to path relative to the package root.
pub type SharedFolderMap = BTreeMap<SharedFolderType, PathBuf>;

/// Services every descriptor in the catalog is built from.
#[derive(Clone)]
pub struct PackageContext {
    pub paths: LibraryPaths,
    pub github: Arc<GitHubClient>,
    pub downloads: Arc<DownloadService>,
}

impl PackageContext {
    pub fn new(paths: LibraryPaths, github_token: Option<String>) -> Result<Self> {
        Ok(Self {
            paths,
            github: Arc::new(GitHubClient::new(github_token.clone())?),
            downloads: Arc::new(DownloadService::new(github_token)?),
        })
    }
}

/// Contract every installable package type fulfils.
#[async_trait]
pub trait PackageDescriptor: Send + Sync {
    /// Unique, case-sensitive identifier.
    fn name(&self) -> &str;
    fn display_name(&self) -> String;
    fn set_display_name(&self, display_name: &str);
    fn author(&self) -> &str;
    fn blurb(&self) -> &str;
    fn github_url(&self) -> &str;
    /// Entry point relative to the install directory.
    fn launch_command(&self) -> &str;
    fn preview_image_url(&self) -> &str;
    fn launch_options(&self) -> &[LaunchOptionDefinition];

    fn shared_folders(&self) -> Option<&SharedFolderMap> {
        None
    }

    /// Packages without meaningful releases install from branches only.
    fn should_ignore_releases(&self) -> bool {
        false
    }

    fn by_author(&self) -> String {
        format!("By {}", self.author())
    }

    /// Where [`PackageDescriptor::download_package`] writes the archive.
    fn download_location(&self) -> PathBuf;

    fn install_location(&self) -> Option<PathBuf>;
    fn set_install_location(&self, location: PathBuf);

    fn update_available(&self) -> bool;
    fn set_update_available(&self, available: bool);

    fn events(&self) -> &PackageEvents;

    /// Releases (`use_releases`) or branch heads as selectable versions.
    async fn get_all_versions(&self, use_releases: bool) -> Result<Vec<PackageVersion>>;

    async fn get_all_branches(&self) -> Result<Vec<GitHubBranch>>;

    async fn get_all_releases(&self) -> Result<Vec<GitHubRelease>>;

    /// Newest installable version string (tag, or head SHA when releases
    /// are ignored).
    async fn get_latest_version(&self) -> Result<String>;

    /// A page of commits; `None` when history is unavailable.
    async fn get_all_commits(&self, branch: &str, page: u32, per_page: u32) -> Result<Option<Vec<GitCommit>>>;

    /// Fetch the archive for a tag or commit and return where it was written.
    async fn download_package(
        &self,
        version: &str,
        is_commit_hash: bool,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;

    /// Post-download setup into [`PackageDescriptor::install_location`].
    async fn install_package(&self, progress: Option<&ProgressSender>, cancel: &CancellationToken) -> Result<()>;

    /// Start the package from `install_path` with extra `arguments`.
    async fn run_package(&self, install_path: &Path, arguments: &[String]) -> Result<()>;

    /// Stop the running package, if any.
    async fn shutdown(&self) -> Result<()>;

    async fn check_for_updates(&self, package: &InstalledPackage) -> Result<bool>;

    /// Download and install the newest version over `package`, returning the
    /// new version string.
    async fn update(
        &self,
        package: &InstalledPackage,
        progress: Option<&ProgressSender>,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<String>;
}
