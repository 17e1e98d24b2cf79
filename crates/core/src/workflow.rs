//! ComfyUI API-format workflow parsing and parameter splicing.
//!
//! Parses workflow JSON into nodes, collects weight filenames referenced
//! directly by node inputs, merges them with implied and caller-supplied
//! weights, and writes user-facing generation parameters into the graph.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::download_manager::supported_filetype;
use crate::error::CoreError;
use crate::preprocessors::detect_implied_weights;

// ---------------------------------------------------------------------------
// Node class types and titles the parameter splicer targets
// ---------------------------------------------------------------------------

/// Prompt enhancer node holding the positive prompt text.
const PROMPT_ENHANCER_CLASS: &str = "JurdnsGroqAPIPromptEnhancer";

/// Negative prompt node.
const NEGATIVE_PROMPT_CLASS: &str = "easy negative";

/// Global seed broadcaster.
const SEED_EVERYWHERE_CLASS: &str = "Seed Everywhere";

/// Scheduler node class.
const BASIC_SCHEDULER_CLASS: &str = "BasicScheduler";

/// Node ID of the scheduler that drives the main sampling pass. Other
/// schedulers in the graph (refiners, upscalers) keep their own step counts.
const MAIN_SCHEDULER_NODE_ID: &str = "709";

/// `_meta.title` of the node selecting the output image size.
const IMAGE_SIZE_TITLE: &str = "Basic Image size";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single node in a parsed ComfyUI workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Node ID (string key from the JSON object).
    pub id: String,
    /// ComfyUI class type. Nodes without one are kept but never matched.
    pub class_type: Option<String>,
    /// Raw input values for this node.
    pub inputs: serde_json::Value,
    /// `_meta.title`, if present.
    pub title: Option<String>,
}

/// Output resolutions offered to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "512x768")]
    Portrait512x768,
    #[default]
    #[serde(rename = "768x1280")]
    Portrait768x1280,
    #[serde(rename = "1024x1024")]
    Square1024,
    #[serde(rename = "1024x1536")]
    Portrait1024x1536,
}

impl Resolution {
    pub const ALL: &'static [Resolution] = &[
        Self::Portrait512x768,
        Self::Portrait768x1280,
        Self::Square1024,
        Self::Portrait1024x1536,
    ];

    /// `WIDTHxHEIGHT` form accepted from users.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait512x768 => "512x768",
            Self::Portrait768x1280 => "768x1280",
            Self::Square1024 => "1024x1024",
            Self::Portrait1024x1536 => "1024x1536",
        }
    }

    /// Option label used by the image-size node.
    pub fn node_label(&self) -> &'static str {
        match self {
            Self::Portrait512x768 => "512x768 (0.67)",
            Self::Portrait768x1280 => "768x1280 (0.6)",
            Self::Square1024 => "1024x1024 (1.0)",
            Self::Portrait1024x1536 => "1024x1536 (0.67)",
        }
    }
}

impl FromStr for Resolution {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == trimmed)
            .ok_or_else(|| {
                let choices: Vec<&str> = Self::ALL.iter().map(Resolution::as_str).collect();
                CoreError::Validation(format!(
                    "Unknown resolution '{trimmed}'. Choices: {}",
                    choices.join(", ")
                ))
            })
    }
}

/// User-facing generation parameters spliced into the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub resolution: Resolution,
    pub steps: u32,
    pub seed: u64,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a ComfyUI API-format workflow into its nodes.
///
/// The expected format is an object whose keys are node IDs and whose
/// values carry `class_type`, `inputs`, and optionally `_meta.title`.
/// Nodes are returned sorted by ID.
pub fn parse_workflow(json: &serde_json::Value) -> Result<Vec<WorkflowNode>, CoreError> {
    let obj = json.as_object().ok_or_else(|| {
        CoreError::Validation("Workflow JSON must be an object".to_string())
    })?;

    if obj.is_empty() {
        return Err(CoreError::Validation(
            "Workflow JSON must contain at least one node".to_string(),
        ));
    }

    let mut nodes: Vec<WorkflowNode> = obj
        .iter()
        .map(|(node_id, node_value)| WorkflowNode {
            id: node_id.clone(),
            class_type: node_value
                .get("class_type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            inputs: node_value
                .get("inputs")
                .cloned()
                .unwrap_or(serde_json::Value::Object(serde_json::Map::new())),
            title: node_value
                .get("_meta")
                .and_then(|meta| meta.get("title"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
        .collect();

    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(nodes)
}

/// Weight filenames referenced directly by node inputs.
///
/// Any string input ending in a supported filetype counts. Deduplicated in
/// node order.
pub fn referenced_weights(nodes: &[WorkflowNode]) -> Vec<String> {
    let mut weights: Vec<String> = Vec::new();
    for node in nodes {
        let Some(inputs) = node.inputs.as_object() else {
            continue;
        };
        for value in inputs.values() {
            if let Some(name) = value.as_str() {
                if supported_filetype(name).is_some() && !weights.iter().any(|w| w == name) {
                    weights.push(name.to_string());
                }
            }
        }
    }
    weights
}

/// The full set of weights a run needs: caller-supplied first, then those
/// referenced by inputs, then those implied by preprocessor nodes.
pub fn requested_weights(explicit: &[String], nodes: &[WorkflowNode]) -> Vec<String> {
    let mut weights: Vec<String> = Vec::new();
    let sources = explicit
        .iter()
        .cloned()
        .chain(referenced_weights(nodes))
        .chain(detect_implied_weights(nodes));
    for weight in sources {
        if !weights.contains(&weight) {
            weights.push(weight);
        }
    }
    weights
}

// ---------------------------------------------------------------------------
// Parameter splicing
// ---------------------------------------------------------------------------

/// Write generation parameters into the workflow in place.
///
/// Returns the IDs of every node that was updated, sorted.
pub fn apply_generation_params(
    workflow: &mut serde_json::Value,
    params: &GenerationParams,
) -> Result<Vec<String>, CoreError> {
    let obj = workflow.as_object_mut().ok_or_else(|| {
        CoreError::Validation("Workflow JSON must be an object".to_string())
    })?;

    let mut updated = Vec::new();

    for (node_id, node) in obj.iter_mut() {
        let class_type = node
            .get("class_type")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let title = node
            .get("_meta")
            .and_then(|meta| meta.get("title"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut touched = false;

        match class_type.as_deref() {
            Some(PROMPT_ENHANCER_CLASS) => {
                set_input(node, "text", serde_json::json!(params.prompt))?;
                touched = true;
            }
            Some(NEGATIVE_PROMPT_CLASS) => {
                set_input(node, "negative", serde_json::json!(params.negative_prompt))?;
                touched = true;
            }
            Some(SEED_EVERYWHERE_CLASS) => {
                set_input(node, "seed", serde_json::json!(params.seed))?;
                touched = true;
            }
            Some(BASIC_SCHEDULER_CLASS) if node_id == MAIN_SCHEDULER_NODE_ID => {
                set_input(node, "steps", serde_json::json!(params.steps))?;
                touched = true;
            }
            _ => {}
        }

        if title.as_deref() == Some(IMAGE_SIZE_TITLE) {
            set_input(
                node,
                "resolution",
                serde_json::json!(params.resolution.node_label()),
            )?;
            touched = true;
        }

        if touched {
            updated.push(node_id.clone());
        }
    }

    updated.sort();
    Ok(updated)
}

fn set_input(
    node: &mut serde_json::Value,
    input: &str,
    value: serde_json::Value,
) -> Result<(), CoreError> {
    let node_obj = node
        .as_object_mut()
        .ok_or_else(|| CoreError::Validation("Workflow node must be an object".to_string()))?;
    let inputs = node_obj
        .entry("inputs")
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    let inputs = inputs
        .as_object_mut()
        .ok_or_else(|| CoreError::Validation("Node 'inputs' must be an object".to_string()))?;
    inputs.insert(input.to_string(), value);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
