//! GitHub API client for releases, branches and commits.
//!
//! Listings are paged and kept in a short-lived in-memory cache keyed by
//! repository; commit pages are always fetched fresh.

use crate::config::NetworkConfig;
use crate::models::{GitHubBranch, GitHubCommit, GitHubRelease, GitHubRepo};
use crate::network::client::HttpClient;
use crate::{MatrixError, Result};
use mini_moka::sync::Cache;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

const ACCEPT_HEADER: (&str, &str) = ("Accept", "application/vnd.github+json");

/// GitHub API client.
pub struct GitHubClient {
    http: HttpClient,
    api_base: String,
    web_base: String,
    releases: Cache<String, Vec<GitHubRelease>>,
    branches: Cache<String, Vec<GitHubBranch>>,
}

impl GitHubClient {
    /// Client for the public GitHub API.
    pub fn new(token: Option<String>) -> Result<Self> {
        Ok(Self::with_http(HttpClient::new()?.with_token(token)))
    }

    pub fn with_http(http: HttpClient) -> Self {
        let cache_ttl = NetworkConfig::GITHUB_CACHE_TTL;
        Self {
            http,
            api_base: NetworkConfig::GITHUB_API_BASE.to_string(),
            web_base: NetworkConfig::GITHUB_WEB_BASE.to_string(),
            releases: Cache::builder().time_to_live(cache_ttl).max_capacity(32).build(),
            branches: Cache::builder().time_to_live(cache_ttl).max_capacity(32).build(),
        }
    }

    /// Point API and archive requests at different hosts (used by tests and mirrors).
    pub fn with_base_urls(mut self, api_base: impl Into<String>, web_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.web_base = web_base.into().trim_end_matches('/').to_string();
        self
    }

    /// All releases, newest first.
    pub async fn get_releases(&self, repo: &GitHubRepo) -> Result<Vec<GitHubRelease>> {
        let key = repo.full_name();
        if let Some(releases) = self.releases.get(&key) {
            debug!("GitHub releases cache hit for {}", key);
            return Ok(releases);
        }

        let releases: Vec<GitHubRelease> = self.get_paged(&format!("repos/{}/releases", key)).await?;
        info!("Fetched {} releases from GitHub for {}", releases.len(), key);
        self.releases.insert(key, releases.clone());
        Ok(releases)
    }

    /// Newest release that is neither a draft nor (unless allowed) a prerelease.
    pub async fn get_latest_release(
        &self,
        repo: &GitHubRepo,
        include_prerelease: bool,
    ) -> Result<Option<GitHubRelease>> {
        let releases = self.get_releases(repo).await?;
        Ok(releases
            .into_iter()
            .find(|r| !r.draft && (include_prerelease || !r.prerelease)))
    }

    /// All branches with their head commit.
    pub async fn get_branches(&self, repo: &GitHubRepo) -> Result<Vec<GitHubBranch>> {
        let key = repo.full_name();
        if let Some(branches) = self.branches.get(&key) {
            debug!("GitHub branches cache hit for {}", key);
            return Ok(branches);
        }

        let branches: Vec<GitHubBranch> = self.get_paged(&format!("repos/{}/branches", key)).await?;
        info!("Fetched {} branches from GitHub for {}", branches.len(), key);
        self.branches.insert(key, branches.clone());
        Ok(branches)
    }

    /// One page (1-based) of commits on `branch`, newest first.
    pub async fn get_commits(
        &self,
        repo: &GitHubRepo,
        branch: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<GitHubCommit>> {
        let base = format!("{}/repos/{}/commits", self.api_base, repo.full_name());
        let mut url = url::Url::parse(&base).map_err(|e| MatrixError::Config {
            message: format!("Invalid GitHub API URL {}: {}", base, e),
        })?;
        url.query_pairs_mut()
            .append_pair("sha", branch)
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.max(1).to_string());
        self.get_json(url.as_str()).await
    }

    /// A single commit by SHA or ref.
    pub async fn get_commit(&self, repo: &GitHubRepo, reference: &str) -> Result<GitHubCommit> {
        let url = format!("{}/repos/{}/commits/{}", self.api_base, repo.full_name(), reference);
        self.get_json(&url).await
    }

    /// Source archive URL for a release tag.
    pub fn release_archive_url(&self, repo: &GitHubRepo, tag: &str) -> String {
        format!("{}/repos/{}/zipball/{}", self.api_base, repo.full_name(), tag)
    }

    /// Source archive URL for a commit SHA.
    pub fn commit_archive_url(&self, repo: &GitHubRepo, sha: &str) -> String {
        format!("{}/{}/archive/{}.zip", self.web_base, repo.full_name(), sha)
    }

    /// Drop cached listings for `repo`.
    pub fn invalidate_cache(&self, repo: &GitHubRepo) {
        let key = repo.full_name();
        self.releases.invalidate(&key);
        self.branches.invalidate(&key);
    }

    async fn get_paged<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let per_page = NetworkConfig::GITHUB_PER_PAGE;
        let mut all = Vec::new();

        for page in 1..=NetworkConfig::GITHUB_MAX_PAGES {
            let url = format!("{}/{}?per_page={}&page={}", self.api_base, path, per_page, page);
            let items: Vec<T> = self.get_json(&url).await?;
            let count = items.len();
            all.extend(items);

            if count < per_page as usize {
                break;
            }
        }

        Ok(all)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get_with_headers(url, &[ACCEPT_HEADER]).await?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN && self.http.rate_limit_state().remaining == Some(0) {
            return Err(MatrixError::RateLimited {
                service: "GitHub".to_string(),
                retry_after_secs: self.http.rate_limit_state().secs_until_reset(),
            });
        }

        if !status.is_success() {
            return Err(MatrixError::GitHubApi {
                message: format!("GitHub API returned {} for {}", status, url),
                status_code: Some(status.as_u16()),
            });
        }

        response.json::<T>().await.map_err(|e| MatrixError::Json {
            message: format!("Failed to parse GitHub response from {}: {}", url, e),
            source: None,
        })
    }
}
