//! GitHub REST API wire types.

use serde::{Deserialize, Serialize};

/// GitHub release information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub zipball_url: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Commit reference embedded in a branch listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommitRef {
    pub sha: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// GitHub branch information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubBranch {
    pub name: String,
    pub commit: GitHubCommitRef,
}

/// Inner commit object of a commit listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommitDetail {
    pub message: String,
}

/// GitHub commit information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: GitHubCommitDetail,
}

impl GitHubCommit {
    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.commit.message.lines().next().unwrap_or_default()
    }
}

/// Owner/name pair parsed from a GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitHubRepo {
    pub owner: String,
    pub name: String,
}

impl GitHubRepo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `https://github.com/<owner>/<name>` (with or without `.git`).
    pub fn from_url(github_url: &str) -> Option<Self> {
        let parsed = url::Url::parse(github_url).ok()?;
        if parsed.host_str() != Some("github.com") {
            return None;
        }
        let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let name = segments.next()?.trim_end_matches(".git");
        Some(Self::new(owner, name))
    }

    /// `owner/name`, used as API path and cache key.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for GitHubRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
