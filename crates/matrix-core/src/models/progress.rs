//! Progress reports pushed by long-running operations.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What kind of work a progress report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressType {
    #[default]
    Generic,
    Download,
    Extract,
    Update,
}

/// A single progress update.
///
/// `message` and `title` are free text; consumers that want to react to a
/// particular phase have to inspect them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Completion fraction in `0.0..=1.0`, when known.
    #[serde(default)]
    pub progress: Option<f32>,
    #[serde(default)]
    pub is_indeterminate: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub kind: ProgressType,
}

impl ProgressReport {
    /// Determinate report at `progress` (fraction, clamped to `0..=1`).
    pub fn new(progress: f32, kind: ProgressType) -> Self {
        Self {
            progress: Some(progress.clamp(0.0, 1.0)),
            kind,
            ..Default::default()
        }
    }

    /// Determinate report from a byte count.
    pub fn from_bytes(current: u64, total: u64, kind: ProgressType) -> Self {
        let fraction = if total == 0 {
            0.0
        } else {
            current as f32 / total as f32
        };
        Self::new(fraction, kind)
    }

    /// Report with no known completion.
    pub fn indeterminate(kind: ProgressType) -> Self {
        Self {
            is_indeterminate: true,
            kind,
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Completion as a percentage in `0..=100`; indeterminate reports are 0.
    pub fn percentage(&self) -> f32 {
        self.progress.map(|p| p * 100.0).unwrap_or(0.0)
    }
}

/// Channel end that producers push [`ProgressReport`]s into.
pub type ProgressSender = mpsc::Sender<ProgressReport>;

/// Send a report if a sender was supplied; a dropped receiver is ignored.
pub async fn report(progress: Option<&ProgressSender>, update: ProgressReport) {
    if let Some(tx) = progress {
        let _ = tx.send(update).await;
    }
}
