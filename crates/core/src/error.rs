/// Public listing of every weight the manifest can resolve.
pub const SUPPORTED_WEIGHTS_CATALOG: &str =
    "https://github.com/replicate/cog-comfyui/blob/main/supported_weights.md";

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{identifier} unavailable. View the list of available weights: {catalog}")]
    UnresolvableWeight {
        identifier: String,
        catalog: &'static str,
    },

    #[error("Unsupported weight filetype: {0}")]
    UnsupportedFiletype(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Build an [`CoreError::UnresolvableWeight`] pointing at the public catalog.
    pub fn unresolvable(identifier: impl Into<String>) -> Self {
        Self::UnresolvableWeight {
            identifier: identifier.into(),
            catalog: SUPPORTED_WEIGHTS_CATALOG,
        }
    }
}
