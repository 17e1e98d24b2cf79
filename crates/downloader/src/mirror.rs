//! Tarball mirror strategy.
//!
//! Mirror URLs point at `.tar` archives that an external utility (`pget`)
//! fetches and extracts in one step into the destination directory. The
//! process is spawned with `kill_on_drop` so a timeout tears it down.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::TransferError;
use crate::strategy::FetchStrategy;
use crate::task::DownloadTask;

/// Cap on captured stderr (64 KiB).
const MAX_STDERR_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MirrorFetcher {
    program: String,
    timeout: Duration,
}

impl MirrorFetcher {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Argument list passed to the utility for `task`.
    pub fn args(task: &DownloadTask) -> Vec<String> {
        vec![
            "--log-level".to_string(),
            "warn".to_string(),
            "-xf".to_string(),
            task.url.clone(),
            task.destination_dir().display().to_string(),
        ]
    }

    async fn run(&self, task: &DownloadTask) -> Result<(), TransferError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(task))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| TransferError::MirrorSpawn {
            program: self.program.clone(),
            source,
        })?;

        let stderr_handle = child.stderr.take();
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => {
                let stderr_bytes = stderr_task.await.unwrap_or_default();
                Err(TransferError::MirrorFailed {
                    exit_code: status.code().unwrap_or(-1),
                    stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
                })
            }
            Ok(Err(e)) => Err(TransferError::Io(e)),
            // `child` is dropped here and killed.
            Err(_elapsed) => Err(TransferError::MirrorTimeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl FetchStrategy for MirrorFetcher {
    async fn fetch(&self, task: &DownloadTask) -> Result<PathBuf, TransferError> {
        tokio::fs::create_dir_all(task.destination_dir()).await?;

        if let Err(e) = self.run(task).await {
            remove_path(&task.destination).await;
            return Err(e);
        }
        if !tokio::fs::try_exists(&task.destination).await? {
            return Err(TransferError::MirrorMissingOutput {
                path: task.destination.display().to_string(),
            });
        }
        Ok(task.destination.clone())
    }
}

/// Remove whatever an interrupted extraction left at `path`.
pub(crate) async fn remove_path(path: &std::path::Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial download");
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_STDERR_BYTES).read_to_end(&mut buf).await;
    }
    buf
}
