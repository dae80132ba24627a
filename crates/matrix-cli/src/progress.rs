//! Terminal progress bars fed from installer state and progress reports.

use indicatif::{ProgressBar, ProgressStyle};
use matrix_core::ProgressReport;
use matrix_packages::installer::{InstallStage, InstallerState};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

fn new_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar
}

fn show(bar: &ProgressBar, value: f32, is_indeterminate: bool, text: &str) {
    if is_indeterminate {
        bar.enable_steady_tick(Duration::from_millis(120));
    } else {
        bar.disable_steady_tick();
        bar.set_position(value.round().clamp(0.0, 100.0) as u64);
    }
    bar.set_message(text.to_string());
}

/// Draw installer state until it reaches a terminal stage.
pub fn follow_install(mut states: watch::Receiver<InstallerState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = new_bar();
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            let text = if state.description.is_empty() || state.stage != InstallStage::Installing {
                state.text.clone()
            } else {
                format!("{} | {}", state.text, state.description)
            };
            show(&bar, state.value, state.is_indeterminate, &text);
            match state.stage {
                InstallStage::Done => {
                    bar.finish_with_message("Installed");
                    return;
                }
                InstallStage::Failed => {
                    bar.abandon_with_message("Failed");
                    return;
                }
                _ => {}
            }
        }
        bar.finish_and_clear();
    })
}

/// Draw raw progress reports until the sender side is dropped.
pub fn follow_reports(mut reports: mpsc::Receiver<ProgressReport>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = new_bar();
        while let Some(report) = reports.recv().await {
            let text = report.message.as_deref().or(report.title.as_deref()).unwrap_or_default();
            show(&bar, report.percentage(), report.is_indeterminate, text);
        }
        bar.finish_and_clear();
    })
}
