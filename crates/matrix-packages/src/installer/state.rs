//! Observable installer state.

use serde::Serialize;

/// Stages of one install attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum InstallStage {
    #[default]
    Idle,
    EnsuringPrerequisites,
    Downloading,
    Installing,
    LinkingSharedFolders,
    Committing,
    Done,
    Failed,
}

impl InstallStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallStage::Done | InstallStage::Failed)
    }
}

/// Snapshot published on the installer's progress channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallerState {
    pub stage: InstallStage,
    /// Percentage in `0..=100`.
    pub value: f32,
    pub is_indeterminate: bool,
    /// Short status line.
    pub text: String,
    /// Latest console output of the install step.
    pub description: String,
    /// An installed package already uses the chosen install name.
    pub duplicate_warning: bool,
}
