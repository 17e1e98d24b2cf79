use cogflux_core::error::CoreError;

/// Failure while moving bytes from a remote source to disk.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote returned a non-2xx status code.
    #[error("Download of {url} failed ({status}): {body}")]
    Status {
        status: u16,
        url: String,
        /// Raw response body, surfaced verbatim (auth errors included).
        body: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The mirror utility could not be started.
    #[error("Failed to launch {program}: {source}")]
    MirrorSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The mirror utility exited unsuccessfully.
    #[error("Mirror fetch exited with code {exit_code}: {stderr}")]
    MirrorFailed { exit_code: i32, stderr: String },

    #[error("Mirror fetch timed out after {elapsed_ms}ms")]
    MirrorTimeout { elapsed_ms: u64 },

    /// The mirror utility exited cleanly but the expected file is absent.
    #[error("Mirror fetch completed without producing {path}")]
    MirrorMissingOutput { path: String },
}

/// Error returned by the weight orchestrator. Any value of this type means at
/// least one requested weight is not on disk.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Resolution or validation failure (unknown weight, bad filetype, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The transfer for `identifier` failed; its partial output was removed.
    #[error("Failed to download {identifier}: {source}")]
    Transfer {
        identifier: String,
        #[source]
        source: TransferError,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
