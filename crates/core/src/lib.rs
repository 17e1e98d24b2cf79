//! Pure weight-resolution logic for the cogflux ComfyUI deployment.
//!
//! Nothing in this crate performs network I/O. It owns the weight manifest,
//! the irregular special-case table, implicit-weight detection for
//! preprocessor nodes, workflow parsing, and download path helpers.

pub mod download_manager;
pub mod error;
pub mod manifest;
pub mod preprocessors;
pub mod special;
pub mod workflow;
