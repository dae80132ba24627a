//! Installing packages into the library.

mod orchestrator;
mod selection;
mod state;

pub use orchestrator::{validate_install_name, InstallOrchestrator, InstallOutcome, InstallRequest};
pub use selection::{default_branch, VersionChoice, VersionSelector};
pub use state::{InstallStage, InstallerState};
