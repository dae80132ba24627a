//! Shared reqwest client.
//!
//! Adds the launcher user agent and an optional bearer token, and remembers
//! the `X-RateLimit-*` headers of the last response so callers can tell a
//! rate-limit 403 from a permission 403.

use crate::config::{AppConfig, NetworkConfig};
use crate::{MatrixError, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Delay inserted before a request once the quota is nearly spent.
const LOW_QUOTA_DELAY: Duration = Duration::from_millis(500);

/// Quota reported by the last response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    /// Unix time at which the window resets.
    pub reset: Option<u64>,
}

impl RateLimitState {
    fn observe(&mut self, headers: &HeaderMap) {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };
        self.remaining = read("x-ratelimit-remaining").or(self.remaining);
        self.limit = read("x-ratelimit-limit").or(self.limit);
        self.reset = read("x-ratelimit-reset").or(self.reset);
    }

    /// Less than a tenth of the quota is left.
    pub fn should_throttle(&self) -> bool {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => remaining < (limit / 10).max(1),
            _ => false,
        }
    }

    pub fn secs_until_reset(&self) -> Option<u64> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        self.reset.and_then(|reset| reset.checked_sub(now)).filter(|secs| *secs > 0)
    }
}

/// HTTP client used for API calls and downloads.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    /// Whole-request timeout; `None` means only the connect timeout applies.
    timeout: Option<Duration>,
    token: Option<String>,
    quota: Mutex<RateLimitState>,
}

impl HttpClient {
    /// Client for API calls, bounded by [`NetworkConfig::REQUEST_TIMEOUT`].
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(Client::builder().timeout(timeout), Some(timeout))
    }

    /// Client for streaming downloads: connect timeout only.
    pub fn for_downloads() -> Result<Self> {
        Self::build(Client::builder(), None)
    }

    fn build(builder: ClientBuilder, timeout: Option<Duration>) -> Result<Self> {
        let client = builder
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(AppConfig::USER_AGENT)
            .build()
            .map_err(|e| MatrixError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
            })?;
        Ok(Self {
            client,
            timeout,
            token: None,
            quota: Mutex::new(RateLimitState::default()),
        })
    }

    /// Authenticate every request with `token`; blank tokens are ignored.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn rate_limit_state(&self) -> RateLimitState {
        *self.quota.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// GET `url`. Only 429 is turned into an error; other statuses are the
    /// caller's to interpret.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(self.client.get(url), url).await
    }

    pub async fn get_with_headers(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response> {
        let request = headers
            .iter()
            .fold(self.client.get(url), |request, (name, value)| request.header(*name, *value));
        self.send(request, url).await
    }

    async fn send(&self, mut request: RequestBuilder, url: &str) -> Result<Response> {
        let quota = self.rate_limit_state();
        if quota.should_throttle() {
            warn!(
                "{:?} of {:?} requests left, slowing down",
                quota.remaining, quota.limit
            );
            tokio::time::sleep(LOW_QUOTA_DELAY).await;
        }

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!("GET {}", url);
        let response = request.send().await.map_err(|e| self.request_error(e))?;
        self.quota
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(response.headers());

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(MatrixError::RateLimited {
                service: extract_domain(url),
                retry_after_secs,
            });
        }
        Ok(response)
    }

    /// Timeout that applied to a request sent by this client.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(NetworkConfig::CONNECT_TIMEOUT)
    }

    fn request_error(&self, err: reqwest::Error) -> MatrixError {
        if err.is_timeout() {
            MatrixError::Timeout(self.effective_timeout())
        } else {
            err.into()
        }
    }
}

/// Host part of `url`, for error messages.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
