//! Weight acquisition for the cogflux ComfyUI deployment.
//!
//! [`WeightsDownloader`](orchestrator::WeightsDownloader) resolves requested
//! weight identifiers against the manifest (or the special-case table),
//! skips anything already on disk, and fetches the rest one at a time via
//! the strategy matching each file's declared protocol.

pub mod config;
pub mod error;
pub mod http;
pub mod mirror;
pub mod orchestrator;
pub mod strategy;
pub mod task;

pub use config::{Credentials, DownloaderConfig};
pub use error::{DownloadError, TransferError};
pub use orchestrator::{AcquisitionEvent, AcquisitionReport, Advisory, WeightsDownloader};
pub use strategy::{FetchStrategy, Strategies};
pub use task::DownloadTask;
