//! Version selection for an install.
//!
//! Release mode offers tags; branch mode offers branches and the commits on
//! the selected branch.

use crate::package::PackageDescriptor;
use matrix_core::{GitCommit, InstallationConfig, MatrixError, PackageVersion, Result};
use std::sync::Arc;
use tracing::debug;

/// Branch picked when switching to branch mode: `master`, else `main`, else
/// the first one listed.
pub fn default_branch<'a>(branches: &[&'a str]) -> Option<&'a str> {
    ["master", "main"]
        .into_iter()
        .find_map(|wanted| branches.iter().copied().find(|b| *b == wanted))
        .or_else(|| branches.first().copied())
}

/// What to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChoice {
    /// A release tag.
    Release { tag: String },
    /// A specific commit on a branch.
    Commit { branch: String, sha: String },
}

impl VersionChoice {
    /// Tag or SHA passed to the download step and persisted on the record.
    pub fn version(&self) -> &str {
        match self {
            VersionChoice::Release { tag } => tag,
            VersionChoice::Commit { sha, .. } => sha,
        }
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, VersionChoice::Commit { .. })
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            VersionChoice::Release { .. } => None,
            VersionChoice::Commit { branch, .. } => Some(branch),
        }
    }
}

/// Interactive version picker state for one descriptor.
pub struct VersionSelector {
    descriptor: Arc<dyn PackageDescriptor>,
    is_release_mode: bool,
    available_versions: Vec<PackageVersion>,
    selected_version: Option<PackageVersion>,
    available_commits: Vec<GitCommit>,
    selected_commit: Option<GitCommit>,
}

impl VersionSelector {
    /// Release mode is on unless the package ignores releases.
    pub fn new(descriptor: Arc<dyn PackageDescriptor>) -> Self {
        let is_release_mode = !descriptor.should_ignore_releases();
        Self {
            descriptor,
            is_release_mode,
            available_versions: Vec::new(),
            selected_version: None,
            available_commits: Vec::new(),
            selected_commit: None,
        }
    }

    pub fn is_release_mode(&self) -> bool {
        self.is_release_mode
    }

    pub fn available_versions(&self) -> &[PackageVersion] {
        &self.available_versions
    }

    pub fn selected_version(&self) -> Option<&PackageVersion> {
        self.selected_version.as_ref()
    }

    pub fn available_commits(&self) -> &[GitCommit] {
        &self.available_commits
    }

    pub fn selected_commit(&self) -> Option<&GitCommit> {
        self.selected_commit.as_ref()
    }

    /// Notes for the selected version (release body or head commit message).
    pub fn release_notes(&self) -> Option<&str> {
        self.selected_version
            .as_ref()
            .and_then(|v| v.release_notes.as_deref())
    }

    /// Fetch versions for the current mode and apply the default selection.
    pub async fn load(&mut self) -> Result<()> {
        self.available_versions = self.descriptor.get_all_versions(self.is_release_mode).await?;
        self.available_commits.clear();
        self.selected_commit = None;

        self.selected_version = if self.is_release_mode {
            self.available_versions.first().cloned()
        } else {
            let names: Vec<&str> = self.available_versions.iter().map(|v| v.tag_name.as_str()).collect();
            default_branch(&names).and_then(|name| {
                self.available_versions
                    .iter()
                    .find(|v| v.tag_name == name)
                    .cloned()
            })
        };

        if !self.is_release_mode {
            self.load_commits().await?;
        }
        debug!(
            "Loaded {} versions for {} (release mode: {})",
            self.available_versions.len(),
            self.descriptor.name(),
            self.is_release_mode
        );
        Ok(())
    }

    /// Switch between release and branch mode and reload.
    ///
    /// Release mode cannot be enabled for packages that ignore releases.
    pub async fn set_release_mode(&mut self, release_mode: bool) -> Result<()> {
        if release_mode && self.descriptor.should_ignore_releases() {
            return Err(MatrixError::validation(
                "release_mode",
                format!("{} does not publish releases", self.descriptor.name()),
            ));
        }
        self.is_release_mode = release_mode;
        self.load().await
    }

    /// Select a loaded version by tag or branch name.
    pub async fn select_version(&mut self, tag_name: &str) -> Result<()> {
        let version = self
            .available_versions
            .iter()
            .find(|v| v.tag_name == tag_name)
            .cloned()
            .ok_or_else(|| MatrixError::InvalidVersion {
                version: tag_name.to_string(),
            })?;
        self.selected_version = Some(version);
        if !self.is_release_mode {
            self.load_commits().await?;
        }
        Ok(())
    }

    /// Select a loaded commit of the current branch.
    pub fn select_commit(&mut self, sha: &str) -> Result<()> {
        let commit = self
            .available_commits
            .iter()
            .find(|c| c.sha == sha || c.sha.starts_with(sha))
            .cloned()
            .ok_or_else(|| MatrixError::InvalidVersion {
                version: sha.to_string(),
            })?;
        self.selected_commit = Some(commit);
        Ok(())
    }

    /// The current selection, if complete.
    pub fn choice(&self) -> Option<VersionChoice> {
        let version = self.selected_version.as_ref()?;
        if self.is_release_mode {
            return Some(VersionChoice::Release {
                tag: version.tag_name.clone(),
            });
        }
        let commit = self.selected_commit.as_ref()?;
        Some(VersionChoice::Commit {
            branch: version.tag_name.clone(),
            sha: commit.sha.clone(),
        })
    }

    async fn load_commits(&mut self) -> Result<()> {
        self.available_commits.clear();
        self.selected_commit = None;
        let Some(branch) = self.selected_version.as_ref().map(|v| v.tag_name.clone()) else {
            return Ok(());
        };

        let commits = self
            .descriptor
            .get_all_commits(&branch, 1, InstallationConfig::COMMITS_PER_PAGE)
            .await?
            .unwrap_or_default();
        self.selected_commit = commits.first().cloned();
        self.available_commits = commits;
        Ok(())
    }
}
