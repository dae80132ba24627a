//! Error types for the Matrix launcher.
//!
//! Every fallible operation in the workspace returns [`MatrixError`]. The
//! variants are grouped by [`ErrorKind`] so that the install flow can report
//! failures by category (validation, network, persistence, ...) without
//! matching on every variant.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Matrix launcher.
#[derive(Debug, Error)]
pub enum MatrixError {
    // Input validation
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// HTTP status, when the failure came from a response.
        status_code: Option<u16>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("GitHub API error: {message}")]
    GitHubApi {
        message: String,
        status_code: Option<u16>,
    },

    // Version resolution
    #[error("Version does not resolve: {version}")]
    InvalidVersion { version: String },

    // Install flow
    #[error("Prerequisite {name} could not be installed: {message}")]
    Prerequisite { name: String, message: String },

    #[error("Package install step failed: {message}")]
    InstallStep { message: String },

    #[error("Failed to persist settings: {message}")]
    Persistence { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Process lifecycle
    #[error("Process launch failed for {package}: {message}")]
    LaunchFailed { package: String, message: String },

    // Lookups
    #[error("Package not found: {name}")]
    PackageNotFound { name: String },

    #[error("Installed package not found: {id}")]
    InstalledPackageNotFound { id: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to create link from {src} to {dest}: {reason}")]
    LinkFailed {
        src: PathBuf,
        dest: PathBuf,
        reason: String,
    },

    #[error("Archive error for {path}: {message}")]
    Archive { path: PathBuf, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Matrix operations.
pub type Result<T> = std::result::Result<T, MatrixError>;

/// Coarse failure category surfaced to users of the install flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad user input; nothing was touched.
    Validation,
    /// Source host unreachable or returned an error.
    Network,
    /// The selected tag or commit does not exist.
    InvalidVersion,
    /// A required tool could not be provisioned.
    Prerequisite,
    /// Package-specific setup failed after download.
    InstallStep,
    /// The settings transaction could not be committed.
    Persistence,
    /// The caller cancelled the operation.
    Cancelled,
    /// Launching or stopping a package process failed.
    Process,
    /// Anything else (IO, serialization, configuration).
    Internal,
}

impl MatrixError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MatrixError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        MatrixError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Categorize this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatrixError::Validation { .. } => ErrorKind::Validation,

            MatrixError::Network { .. }
            | MatrixError::Timeout(_)
            | MatrixError::RateLimited { .. }
            | MatrixError::GitHubApi { .. } => ErrorKind::Network,

            MatrixError::InvalidVersion { .. } => ErrorKind::InvalidVersion,
            MatrixError::Prerequisite { .. } => ErrorKind::Prerequisite,
            MatrixError::InstallStep { .. } | MatrixError::Archive { .. } => ErrorKind::InstallStep,
            MatrixError::Persistence { .. } => ErrorKind::Persistence,
            MatrixError::Cancelled => ErrorKind::Cancelled,

            MatrixError::LaunchFailed { .. } => ErrorKind::Process,

            MatrixError::PackageNotFound { .. }
            | MatrixError::InstalledPackageNotFound { .. }
            | MatrixError::Io { .. }
            | MatrixError::LinkFailed { .. }
            | MatrixError::Json { .. }
            | MatrixError::Config { .. }
            | MatrixError::Other(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status attached to a network failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            MatrixError::Network { status_code, .. } | MatrixError::GitHubApi { status_code, .. } => {
                *status_code
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for MatrixError {
    fn from(err: std::io::Error) -> Self {
        MatrixError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MatrixError {
    fn from(err: serde_json::Error) -> Self {
        MatrixError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Timeouts are only known to the client that set them; see
/// `HttpClient`, which maps them to [`MatrixError::Timeout`] itself.
impl From<reqwest::Error> for MatrixError {
    fn from(err: reqwest::Error) -> Self {
        MatrixError::Network {
            message: err.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
        }
    }
}
