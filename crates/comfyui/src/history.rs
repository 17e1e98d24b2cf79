//! Typed view of a ComfyUI `/history/{prompt_id}` entry.
//!
//! The endpoint returns `{"<prompt_id>": {"status": {...}, "outputs": {...}}}`,
//! or `{}` while the prompt is still queued or running.

use std::collections::BTreeMap;

use serde::Deserialize;

/// History record of one prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
    /// Per-node output, keyed by node id.
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStatus {
    /// `"success"` or `"error"`.
    pub status_str: String,
    #[serde(default)]
    pub completed: bool,
    /// Raw `[event_name, payload]` pairs.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

/// Files written by a single output node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<OutputFile>,
    #[serde(default)]
    pub gifs: Vec<OutputFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// `output` for saved files, `temp` for previews.
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl OutputFile {
    /// Path relative to the engine's output (or temp) directory.
    pub fn relative_path(&self) -> String {
        if self.subfolder.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.subfolder, self.filename)
        }
    }
}

/// Lifecycle of a submitted prompt as seen through its history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptState {
    /// No history entry yet.
    Pending,
    Completed(Vec<OutputFile>),
    /// Execution failed; carries the exception message when one was reported.
    Failed(String),
}

/// Interpret the body of `GET /history/{prompt_id}`.
pub fn prompt_state(
    history: &serde_json::Value,
    prompt_id: &str,
) -> Result<PromptState, serde_json::Error> {
    let Some(raw) = history.get(prompt_id) else {
        return Ok(PromptState::Pending);
    };
    let entry: HistoryEntry = serde_json::from_value(raw.clone())?;

    if let Some(status) = &entry.status {
        if status.status_str == "error" {
            return Ok(PromptState::Failed(error_message(status)));
        }
        if !status.completed {
            return Ok(PromptState::Pending);
        }
    }
    Ok(PromptState::Completed(saved_files(&entry)))
}

/// Files of kind `output` across all nodes, in node-id order.
pub fn saved_files(entry: &HistoryEntry) -> Vec<OutputFile> {
    entry
        .outputs
        .values()
        .flat_map(|node| node.images.iter().chain(node.gifs.iter()))
        .filter(|file| file.kind.is_empty() || file.kind == "output")
        .cloned()
        .collect()
}

fn error_message(status: &ExecutionStatus) -> String {
    status
        .messages
        .iter()
        .filter_map(|msg| msg.as_array())
        .filter(|pair| pair.first().and_then(|v| v.as_str()) == Some("execution_error"))
        .filter_map(|pair| pair.get(1)?.get("exception_message")?.as_str())
        .map(str::to_string)
        .next()
        .unwrap_or_else(|| "execution failed".to_string())
}
