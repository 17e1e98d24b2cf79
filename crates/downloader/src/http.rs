//! Streaming HTTP strategies (authenticated blob store and direct links).

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use cogflux_core::download_manager::{
    bytes_to_megabytes, crosses_progress_milestone, download_progress_percent,
};

use crate::config::DownloaderConfig;
use crate::error::TransferError;
use crate::strategy::FetchStrategy;
use crate::task::DownloadTask;

const USER_AGENT: &str = concat!("cogflux/", env!("CARGO_PKG_VERSION"));

/// Cap on the error body kept from a non-2xx response (64 KiB).
pub const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Streams a URL to disk through a `.part` staging file.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    /// Whether the task's bearer token is sent.
    authenticated: bool,
}

impl HttpFetcher {
    /// Shared client with the configured connect and read timeouts.
    pub fn build_client(config: &DownloaderConfig) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
    }

    pub fn authenticated(client: reqwest::Client) -> Self {
        Self {
            client,
            authenticated: true,
        }
    }

    pub fn direct(client: reqwest::Client) -> Self {
        Self {
            client,
            authenticated: false,
        }
    }

    async fn stream_to(&self, task: &DownloadTask, staging: &Path) -> Result<u64, TransferError> {
        let mut request = self.client.get(&task.url);
        if self.authenticated {
            if let Some(token) = task.token.as_deref() {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(TransferError::Status {
                status: status.as_u16(),
                url: task.url.clone(),
                body,
            });
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(staging).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;

            let previous = downloaded;
            downloaded += chunk.len() as u64;
            if crosses_progress_milestone(previous, downloaded, total) {
                tracing::info!(
                    identifier = %task.identifier,
                    downloaded_mb = %format!("{:.1}", bytes_to_megabytes(downloaded)),
                    total_mb = %format!("{:.1}", bytes_to_megabytes(total.unwrap_or(0))),
                    percent = %format!("{:.1}", download_progress_percent(downloaded, total).unwrap_or(0.0)),
                    "Download progress",
                );
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        // A body shorter than its declared length is a truncated transfer.
        if let Some(expected) = total {
            if downloaded < expected {
                return Err(TransferError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("received {downloaded} of {expected} bytes"),
                )));
            }
        }

        Ok(downloaded)
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    async fn fetch(&self, task: &DownloadTask) -> Result<PathBuf, TransferError> {
        let start = Instant::now();
        tokio::fs::create_dir_all(task.destination_dir()).await?;

        let staging = task.staging_path();
        let result = self.stream_to(task, &staging).await;
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&staging, &task.destination).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        tracing::debug!(
            identifier = %task.identifier,
            dest = %task.destination.display(),
            bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            authenticated = self.authenticated,
            "HTTP transfer complete",
        );
        Ok(task.destination.clone())
    }
}

/// First `MAX_ERROR_BODY_BYTES` of an error response, lossily decoded.
async fn read_error_body(response: reqwest::Response) -> String {
    let mut buf = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(Ok(chunk)) = stream.next().await {
        let room = MAX_ERROR_BODY_BYTES - buf.len();
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buf.len() >= MAX_ERROR_BODY_BYTES {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
