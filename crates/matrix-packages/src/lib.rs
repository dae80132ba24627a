//! Matrix Packages - package catalog and install flow for the Matrix launcher.
//!
//! - [`registry::PackageRegistry`] holds the catalog of package descriptors.
//! - [`installer::InstallOrchestrator`] takes a descriptor through
//!   prerequisites, download, install, shared-folder linking and the settings
//!   commit, publishing [`installer::InstallerState`] as it goes.
//! - [`updater::PackageUpdater`] and [`launcher::PackageLauncher`] act on
//!   packages already recorded in settings.
//! - [`locks::PackageLocks`] keeps those three from driving the same package
//!   at once.
//!
//! # Example
//!
//! ```rust,ignore
//! use matrix_packages::installer::{InstallOrchestrator, InstallRequest, VersionSelector};
//!
//! let mut selector = VersionSelector::new(descriptor.clone());
//! selector.load().await?;
//! let request = InstallRequest {
//!     descriptor,
//!     install_name: "webui".into(),
//!     version: selector.choice().unwrap(),
//! };
//! let outcome = orchestrator.install(request, &cancel).await?;
//! ```

pub mod installer;
pub mod launcher;
pub mod locks;
pub mod package;
pub mod prerequisites;
pub mod registry;
pub mod shared_folders;
pub mod updater;

pub use installer::{InstallOrchestrator, InstallOutcome, InstallRequest, InstallStage, InstallerState, VersionChoice};
pub use launcher::PackageLauncher;
pub use locks::{PackageClaim, PackageLocks};
pub use package::{PackageContext, PackageDescriptor, PackageEvent, PackageEvents, Subscription};
pub use prerequisites::{PrerequisiteHelper, SystemPrerequisites};
pub use registry::PackageRegistry;
pub use shared_folders::{LinkWarning, SharedFolders};
pub use updater::{PackageUpdater, UpdateOutcome};
