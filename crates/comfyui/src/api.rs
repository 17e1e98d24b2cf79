//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission and history retrieval using [`reqwest`], plus
//! a polling helper that waits for a prompt's outputs.

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::history::{prompt_state, OutputFile, PromptState};

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    pub number: i32,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    #[error("Unexpected history payload: {0}")]
    InvalidHistory(#[from] serde_json::Error),

    #[error("Prompt {prompt_id} failed: {message}")]
    ExecutionFailed { prompt_id: String, message: String },

    #[error("Prompt {prompt_id} did not finish within {elapsed_ms}ms")]
    Timeout { prompt_id: String, elapsed_ms: u64 },
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// client ID. Returns the server-assigned `prompt_id` and queue
    /// position.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The body is `{}` until
    /// the prompt has run.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Poll the history of `prompt_id` until it completes, fails, or
    /// `timeout` elapses. Returns the saved output files.
    pub async fn wait_for_outputs(
        &self,
        prompt_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Vec<OutputFile>, ComfyUIApiError> {
        let start = Instant::now();
        loop {
            let history = self.get_history(prompt_id).await?;
            match prompt_state(&history, prompt_id)? {
                PromptState::Completed(files) => {
                    tracing::info!(
                        prompt_id,
                        outputs = files.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Prompt completed",
                    );
                    return Ok(files);
                }
                PromptState::Failed(message) => {
                    return Err(ComfyUIApiError::ExecutionFailed {
                        prompt_id: prompt_id.to_string(),
                        message,
                    });
                }
                PromptState::Pending => {}
            }

            if start.elapsed() >= timeout {
                return Err(ComfyUIApiError::Timeout {
                    prompt_id: prompt_id.to_string(),
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
