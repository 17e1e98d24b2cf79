//! ComfyUI REST client.
//!
//! Submits a prepared workflow graph, polls its history entry and extracts
//! the files the output nodes wrote.

pub mod api;
pub mod history;
