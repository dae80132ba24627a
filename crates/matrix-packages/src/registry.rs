//! Catalog of installable package types.

use crate::package::{automatic1111, comfyui, PackageContext, PackageDescriptor};
use matrix_core::{MatrixError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name-indexed catalog of package descriptors, in registration order.
#[derive(Default)]
pub struct PackageRegistry {
    packages: Vec<Arc<dyn PackageDescriptor>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog shipped with the launcher.
    pub fn with_default_catalog(ctx: &PackageContext) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(automatic1111(ctx.clone())?));
        registry.register(Arc::new(comfyui(ctx.clone())?));
        Ok(registry)
    }

    /// Add `descriptor` unless its name is taken.
    ///
    /// The first registration wins; a duplicate is logged and `false` returned.
    pub fn register(&mut self, descriptor: Arc<dyn PackageDescriptor>) -> bool {
        if self.find_by_name(Some(descriptor.name())).is_some() {
            warn!(
                "Package {} is already registered, ignoring duplicate",
                descriptor.name()
            );
            return false;
        }
        debug!("Registered package {}", descriptor.name());
        self.packages.push(descriptor);
        true
    }

    /// Every descriptor, in registration order.
    pub fn list_all(&self) -> &[Arc<dyn PackageDescriptor>] {
        &self.packages
    }

    /// Exact, case-sensitive lookup; `None` input finds nothing.
    pub fn find_by_name(&self, name: Option<&str>) -> Option<Arc<dyn PackageDescriptor>> {
        let name = name?;
        self.packages.iter().find(|p| p.name() == name).cloned()
    }

    /// Like [`PackageRegistry::find_by_name`] but unknown names are an error.
    pub fn require(&self, name: &str) -> Result<Arc<dyn PackageDescriptor>> {
        self.find_by_name(Some(name))
            .ok_or_else(|| MatrixError::PackageNotFound { name: name.to_string() })
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
