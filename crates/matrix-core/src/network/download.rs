//! Streaming file downloads with progress reporting and cancellation.
//!
//! Data is written to `<destination>.part` and renamed into place only once
//! the whole body has arrived, so a failed or cancelled download never
//! leaves a truncated archive at the destination.

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::models::{report, ProgressReport, ProgressSender, ProgressType};
use crate::network::client::HttpClient;
use crate::{MatrixError, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Downloads files over HTTP.
#[derive(Debug)]
pub struct DownloadService {
    http: HttpClient,
}

impl DownloadService {
    pub fn new(token: Option<String>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::for_downloads()?.with_token(token),
        })
    }

    /// Download `url` to `destination`, returning the number of bytes written.
    ///
    /// Non-success statuses become [`MatrixError::Network`] carrying the
    /// status code; callers decide whether a 404 means a bad version.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MatrixError::io_with_path(e, parent))?;
        }

        let temp_path = temp_path_for(destination);
        let result = self.download_to(url, &temp_path, progress, cancel).await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&temp_path, destination)
                    .await
                    .map_err(|e| MatrixError::io_with_path(e, destination))?;
                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn download_to(
        &self,
        url: &str,
        temp_path: &Path,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let response = cancel.run_until_cancelled(self.http.get(url)).await??;
        let status = response.status();
        if !status.is_success() {
            return Err(MatrixError::Network {
                message: format!("Download of {} failed with status {}", url, status),
                status_code: Some(status.as_u16()),
            });
        }

        let total_bytes = response.content_length();
        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| MatrixError::io_with_path(e, temp_path))?;

        report(progress, download_report(0, total_bytes)).await;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_report = Instant::now();

        while let Some(chunk) = cancel.run_until_cancelled(stream.next()).await? {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| MatrixError::io_with_path(e, temp_path))?;
            downloaded += chunk.len() as u64;

            if last_report.elapsed() >= NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL {
                report(progress, download_report(downloaded, total_bytes)).await;
                last_report = Instant::now();
            }
        }

        file.flush()
            .await
            .map_err(|e| MatrixError::io_with_path(e, temp_path))?;
        file.sync_all()
            .await
            .map_err(|e| MatrixError::io_with_path(e, temp_path))?;

        debug!("Finished streaming {} ({} bytes)", url, downloaded);
        report(progress, download_report(downloaded, total_bytes.or(Some(downloaded)))).await;
        Ok(downloaded)
    }
}

fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Unknown sizes (no Content-Length) report as indeterminate.
fn download_report(downloaded: u64, total: Option<u64>) -> ProgressReport {
    match total {
        Some(total) => ProgressReport::from_bytes(downloaded, total, ProgressType::Download),
        None => ProgressReport::indeterminate(ProgressType::Download),
    }
    .with_message("Downloading package...")
}
