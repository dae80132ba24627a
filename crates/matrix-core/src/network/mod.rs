//! Network access: HTTP client, GitHub API and archive downloads.

mod client;
mod download;
mod github;
#[cfg(any(test, feature = "test-support"))]
pub mod test_server;

pub use client::{extract_domain, HttpClient, RateLimitState};
pub use download::DownloadService;
pub use github::GitHubClient;
