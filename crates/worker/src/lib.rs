//! Command-line front end for cogflux.
//!
//! Wires environment configuration, the weight manifest, the downloader and
//! the ComfyUI client together behind the `cogflux-worker` binary.

pub mod cli;
pub mod commands;
pub mod logging;
