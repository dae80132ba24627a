//! Process runner.
//!
//! Spawns a child with piped stdout/stderr and forwards every line to a
//! handler as it arrives. An `Exited` event is delivered after the last line
//! of output.

use crate::cancel::CancellationToken;
use crate::platform;
use crate::{MatrixError, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One line of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub text: String,
    pub is_stderr: bool,
}

/// Something observed on a running child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(ProcessOutput),
    /// Exit code; `-1` when the child was killed by a signal.
    Exited(i32),
}

pub type ProcessEventHandler = Arc<dyn Fn(ProcessEvent) + Send + Sync>;

/// Handle to a spawned child.
#[derive(Debug)]
pub struct ProcessHandle {
    label: String,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    waiter: JoinHandle<i32>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_finished(&self) -> bool {
        self.waiter.is_finished()
    }

    /// Wait for the child to exit and return its exit code.
    pub async fn wait(self) -> Result<i32> {
        let label = self.label;
        self.waiter.await.map_err(|e| MatrixError::Other(format!(
            "Waiting on {} failed: {}",
            label, e
        )))
    }

    /// Stop the child: graceful signal first, hard kill after `grace`.
    pub async fn stop(mut self, grace: Duration) -> Result<i32> {
        if self.waiter.is_finished() {
            return self.wait().await;
        }

        let signalled = self.pid.map(platform::request_graceful_stop).unwrap_or(false);
        if signalled {
            match tokio::time::timeout(grace, &mut self.waiter).await {
                Ok(joined) => {
                    return joined.map_err(|e| MatrixError::Other(e.to_string()));
                }
                Err(_) => debug!("{} ignored graceful stop, killing", self.label),
            }
        }

        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        self.wait().await
    }
}

/// Spawns children and streams their output.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `command`, forwarding output and exit to `handler`.
    pub fn spawn(mut command: Command, label: &str, handler: ProcessEventHandler) -> Result<ProcessHandle> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| MatrixError::LaunchFailed {
            package: label.to_string(),
            message: e.to_string(),
        })?;
        let pid = child.id();
        info!("Started {} (pid {:?})", label, pid);

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, false, handler.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, true, handler.clone())));

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let task_label = label.to_string();
        let waiter = tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            for task in [stdout_task, stderr_task].into_iter().flatten() {
                let _ = task.await;
            }

            let code = match status {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!("Failed to wait on {}: {}", task_label, e);
                    -1
                }
            };
            info!("{} exited with code {}", task_label, code);
            handler(ProcessEvent::Exited(code));
            code
        });

        Ok(ProcessHandle {
            label: label.to_string(),
            pid,
            kill_tx: Some(kill_tx),
            waiter,
        })
    }

    /// Run `command` to completion, streaming output to `on_output`.
    ///
    /// A non-zero exit becomes [`MatrixError::InstallStep`]. Exceeding
    /// `timeout` or cancelling stops the child.
    pub async fn run_to_completion<F>(
        command: Command,
        label: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        on_output: F,
    ) -> Result<()>
    where
        F: Fn(ProcessOutput) + Send + Sync + 'static,
    {
        let handler: ProcessEventHandler = Arc::new(move |event| {
            if let ProcessEvent::Output(line) = event {
                on_output(line);
            }
        });
        let mut handle = Self::spawn(command, label, handler)?;

        let outcome = tokio::select! {
            joined = &mut handle.waiter => Some(joined),
            _ = tokio::time::sleep(timeout) => None,
            _ = cancel.cancelled() => None,
        };

        let code = match outcome {
            Some(joined) => joined.map_err(|e| MatrixError::Other(e.to_string()))?,
            None => {
                let _ = handle.stop(Duration::from_secs(2)).await;
                if cancel.is_cancelled() {
                    return Err(MatrixError::Cancelled);
                }
                return Err(MatrixError::InstallStep {
                    message: format!("{} timed out after {:?}", label, timeout),
                });
            }
        };

        if code != 0 {
            return Err(MatrixError::InstallStep {
                message: format!("{} exited with code {}", label, code),
            });
        }
        Ok(())
    }
}

async fn forward_lines<R>(reader: R, is_stderr: bool, handler: ProcessEventHandler)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(text)) => handler(ProcessEvent::Output(ProcessOutput { text, is_stderr })),
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading child output: {}", e);
                break;
            }
        }
    }
}
