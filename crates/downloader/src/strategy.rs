//! Fetch strategies and protocol dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use cogflux_core::manifest::SourceProtocol;

use crate::config::DownloaderConfig;
use crate::error::TransferError;
use crate::http::HttpFetcher;
use crate::mirror::MirrorFetcher;
use crate::task::DownloadTask;

/// Moves one file from its remote source to `task.destination`.
///
/// Implementations stream to disk and must not leave a file at the
/// destination when they return an error.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Returns the path that was written.
    async fn fetch(&self, task: &DownloadTask) -> Result<PathBuf, TransferError>;
}

/// One strategy per [`SourceProtocol`].
#[derive(Clone)]
pub struct Strategies {
    pub mirror: Arc<dyn FetchStrategy>,
    pub authenticated: Arc<dyn FetchStrategy>,
    pub direct: Arc<dyn FetchStrategy>,
}

impl Strategies {
    /// Build the production strategies: `pget` for the mirror, reqwest for
    /// both HTTP flavours.
    pub fn from_config(config: &DownloaderConfig) -> Result<Self, reqwest::Error> {
        let client = HttpFetcher::build_client(config)?;
        Ok(Self {
            mirror: Arc::new(MirrorFetcher::new(&config.pget_bin, config.mirror_timeout)),
            authenticated: Arc::new(HttpFetcher::authenticated(client.clone())),
            direct: Arc::new(HttpFetcher::direct(client)),
        })
    }

    /// Use the same strategy for every protocol.
    pub fn uniform(strategy: Arc<dyn FetchStrategy>) -> Self {
        Self {
            mirror: strategy.clone(),
            authenticated: strategy.clone(),
            direct: strategy,
        }
    }

    pub fn for_protocol(&self, protocol: SourceProtocol) -> &Arc<dyn FetchStrategy> {
        match protocol {
            SourceProtocol::Mirror => &self.mirror,
            SourceProtocol::HuggingFace => &self.authenticated,
            SourceProtocol::Direct => &self.direct,
        }
    }
}
