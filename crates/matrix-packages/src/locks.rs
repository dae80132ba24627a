//! Per-package exclusion between install, update and launch.
//!
//! Descriptors are shared singletons whose install location is mutable, so
//! only one operation may drive a given package at a time. Every component
//! that calls `set_install_location` takes a [`PackageClaim`] from the same
//! [`PackageLocks`] first.

use matrix_core::{MatrixError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type Held = Arc<Mutex<HashMap<String, &'static str>>>;

/// Set of package names with an operation in progress.
#[derive(Debug, Clone, Default)]
pub struct PackageLocks {
    held: Held,
}

impl PackageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `package` for `operation` ("install", "update", "launch").
    ///
    /// Fails with a validation error naming the operation already running.
    pub fn claim(&self, package: &str, operation: &'static str) -> Result<PackageClaim> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = held.get(package) {
            return Err(MatrixError::validation(
                "package",
                format!("Cannot {} {}: {} already in progress", operation, package, running),
            ));
        }
        held.insert(package.to_string(), operation);
        debug!("Claimed {} for {}", package, operation);
        Ok(PackageClaim {
            held: Arc::clone(&self.held),
            package: package.to_string(),
        })
    }

    /// Operation currently holding `package`.
    pub fn holder(&self, package: &str) -> Option<&'static str> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(package)
            .copied()
    }
}

/// Released on drop.
#[derive(Debug)]
pub struct PackageClaim {
    held: Held,
    package: String,
}

impl Drop for PackageClaim {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.package);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::ErrorKind;

    #[test]
    fn test_claim_excludes_other_operations() {
        let locks = PackageLocks::new();
        let install = locks.claim("ComfyUI", "install").unwrap();
        assert_eq!(locks.holder("ComfyUI"), Some("install"));

        let err = locks.claim("ComfyUI", "update").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("install already in progress"));
        assert!(locks.claim("stable-diffusion-webui", "launch").is_ok());

        drop(install);
        assert_eq!(locks.holder("ComfyUI"), None);
        assert!(locks.claim("ComfyUI", "update").is_ok());
    }

    #[test]
    fn test_clones_share_claims() {
        let locks = PackageLocks::new();
        let shared = locks.clone();
        let _claim = locks.claim("ComfyUI", "install").unwrap();
        assert!(shared.claim("ComfyUI", "launch").is_err());
    }
}
