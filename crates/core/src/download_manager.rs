//! Download helper constants, validation, and pure functions.
//!
//! Provides supported-filetype validation, destination path resolution,
//! progress milestone calculation, token hint generation, and size
//! formatting. Nothing in here touches the network; the filesystem is only
//! consulted by [`weight_exists`].

use std::path::{Path, PathBuf};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Supported filetypes
// ---------------------------------------------------------------------------

/// File extensions that identify a resolvable weight artifact.
pub const SUPPORTED_FILETYPES: &[&str] = &[
    ".ckpt",
    ".safetensors",
    ".pt",
    ".pth",
    ".bin",
    ".onnx",
    ".torchscript",
    ".engine",
    ".patch",
    ".cube",
];

// ---------------------------------------------------------------------------
// Progress reporting thresholds
// ---------------------------------------------------------------------------

/// Transfers smaller than this (10 MiB) do not emit intermediate progress.
pub const PROGRESS_MIN_TOTAL_BYTES: u64 = 10 * 1024 * 1024;

/// A progress line is emitted every time this many bytes (5 MiB) are crossed.
pub const PROGRESS_INTERVAL_BYTES: u64 = 5 * 1024 * 1024;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Return the supported extension an identifier ends with, if any.
pub fn supported_filetype(identifier: &str) -> Option<&'static str> {
    SUPPORTED_FILETYPES
        .iter()
        .copied()
        .find(|ext| identifier.ends_with(ext))
}

/// Validate that `filetype` is one of [`SUPPORTED_FILETYPES`].
///
/// Accepts the extension with or without its leading dot.
pub fn validate_filetype(filetype: &str) -> Result<&'static str, CoreError> {
    let trimmed = filetype.trim();
    let normalized = if trimmed.starts_with('.') {
        trimmed.to_string()
    } else {
        format!(".{trimmed}")
    };

    SUPPORTED_FILETYPES
        .iter()
        .copied()
        .find(|ext| *ext == normalized)
        .ok_or_else(|| {
            CoreError::UnsupportedFiletype(format!(
                "'{trimmed}'. Supported filetypes: {}",
                SUPPORTED_FILETYPES.join(", ")
            ))
        })
}

/// Validate a batch of requested weight identifiers.
///
/// Every identifier must be non-empty and end with a supported filetype.
/// The first offending identifier is reported.
pub fn validate_requested_weights<S: AsRef<str>>(identifiers: &[S]) -> Result<(), CoreError> {
    for identifier in identifiers {
        let identifier = identifier.as_ref().trim();
        if identifier.is_empty() {
            return Err(CoreError::Validation(
                "Weight identifier must not be empty".to_string(),
            ));
        }
        if supported_filetype(identifier).is_none() {
            return Err(CoreError::UnsupportedFiletype(format!(
                "'{identifier}' does not end with one of: {}",
                SUPPORTED_FILETYPES.join(", ")
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Destination resolution
// ---------------------------------------------------------------------------

/// Resolve the file path a weight occupies under `dest`.
///
/// If `dest` already ends with the identifier it is taken to be the file
/// path itself; otherwise the identifier (which may carry a sub-path) is
/// appended to the directory.
pub fn destination_path(identifier: &str, dest: &Path) -> PathBuf {
    if dest.ends_with(identifier) {
        dest.to_path_buf()
    } else {
        dest.join(identifier)
    }
}

/// Directory that must exist before `identifier` can be written under `dest`.
pub fn destination_dir(identifier: &str, dest: &Path) -> PathBuf {
    let path = destination_path(identifier, dest);
    path.parent().map(Path::to_path_buf).unwrap_or(path)
}

/// Whether the weight is already on disk at its expected destination.
pub fn weight_exists(identifier: &str, dest: &Path) -> bool {
    destination_path(identifier, dest).exists()
}

// ---------------------------------------------------------------------------
// Token hint generation
// ---------------------------------------------------------------------------

/// Generate a token hint showing only the last 4 characters.
///
/// Returns `"...XXXX"` if the token is long enough, or `"****"` if too short.
pub fn generate_token_hint(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() >= 4 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("...{tail}")
    } else {
        "****".to_string()
    }
}

// ---------------------------------------------------------------------------
// Progress calculation
// ---------------------------------------------------------------------------

/// Calculate download progress as a percentage (0.0–100.0).
///
/// Returns `None` if the total file size is unknown or zero.
pub fn download_progress_percent(downloaded: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(t) if t > 0 => {
            let pct = (downloaded as f64 / t as f64) * 100.0;
            Some(pct.min(100.0))
        }
        _ => None,
    }
}

/// Whether advancing from `previous` to `current` bytes should emit a
/// progress line for a transfer of `total` bytes.
///
/// Only large transfers report, once per [`PROGRESS_INTERVAL_BYTES`] crossed.
pub fn crosses_progress_milestone(previous: u64, current: u64, total: Option<u64>) -> bool {
    match total {
        Some(t) if t > PROGRESS_MIN_TOTAL_BYTES => {
            current / PROGRESS_INTERVAL_BYTES > previous / PROGRESS_INTERVAL_BYTES
        }
        _ => false,
    }
}

/// Convert a byte count to megabytes (MiB) for log lines.
pub fn bytes_to_megabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MEGABYTE
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- supported_filetype --------------------------------------------------

    #[test]
    fn detects_supported_extensions() {
        assert_eq!(supported_filetype("flux1-dev.safetensors"), Some(".safetensors"));
        assert_eq!(supported_filetype("facenet.pth"), Some(".pth"));
        assert_eq!(
            supported_filetype("Presetpro - Portra 800.cube"),
            Some(".cube")
        );
    }

    #[test]
    fn torchscript_pt_counts_as_pt() {
        assert_eq!(
            supported_filetype("yolox_l.torchscript.pt"),
            Some(".pt")
        );
    }

    #[test]
    fn unsupported_extension_is_none() {
        assert_eq!(supported_filetype("notes.txt"), None);
        assert_eq!(supported_filetype("model.gguf"), None);
    }

    // -- validate_filetype ---------------------------------------------------

    #[test]
    fn filetype_with_or_without_dot_accepted() {
        assert_eq!(validate_filetype(".ckpt").unwrap(), ".ckpt");
        assert_eq!(validate_filetype("onnx").unwrap(), ".onnx");
    }

    #[test]
    fn unknown_filetype_rejected() {
        assert_matches!(validate_filetype(".gguf"), Err(CoreError::UnsupportedFiletype(_)));
        assert_matches!(validate_filetype(""), Err(CoreError::UnsupportedFiletype(_)));
    }

    // -- validate_requested_weights ------------------------------------------

    #[test]
    fn requested_weights_all_supported() {
        assert!(validate_requested_weights(&["a.safetensors", "b.pt", "c.cube"]).is_ok());
    }

    #[test]
    fn requested_weight_with_bad_extension_rejected() {
        let err = validate_requested_weights(&["a.safetensors", "readme.md"]).unwrap_err();
        assert_matches!(err, CoreError::UnsupportedFiletype(msg) if msg.contains("readme.md"));
    }

    #[test]
    fn requested_weight_empty_rejected() {
        assert_matches!(
            validate_requested_weights(&["  "]),
            Err(CoreError::Validation(_))
        );
    }

    // -- destination_path ----------------------------------------------------

    #[test]
    fn identifier_appended_to_directory() {
        let path = destination_path("clip_l.safetensors", Path::new("ComfyUI/models/clip"));
        assert_eq!(path, PathBuf::from("ComfyUI/models/clip/clip_l.safetensors"));
    }

    #[test]
    fn dest_already_naming_file_is_used_verbatim() {
        let dest = Path::new("ComfyUI/models/upscale/4x.pth");
        assert_eq!(destination_path("4x.pth", dest), dest.to_path_buf());
    }

    #[test]
    fn sub_path_identifier_keeps_folder() {
        let path = destination_path("sd15/model.safetensors", Path::new("models/checkpoints"));
        assert_eq!(
            path,
            PathBuf::from("models/checkpoints/sd15/model.safetensors")
        );
        assert_eq!(
            destination_dir("sd15/model.safetensors", Path::new("models/checkpoints")),
            PathBuf::from("models/checkpoints/sd15")
        );
    }

    #[test]
    fn weight_exists_checks_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!weight_exists("ae.safetensors", dir.path()));
        std::fs::write(dir.path().join("ae.safetensors"), b"weights").unwrap();
        assert!(weight_exists("ae.safetensors", dir.path()));
    }

    // -- generate_token_hint -------------------------------------------------

    #[test]
    fn hint_shows_last_four() {
        assert_eq!(generate_token_hint("hf_abcdefgh1234"), "...1234");
    }

    #[test]
    fn hint_short_token_masked() {
        assert_eq!(generate_token_hint("ab"), "****");
        assert_eq!(generate_token_hint(""), "****");
    }

    // -- progress ------------------------------------------------------------

    #[test]
    fn progress_known_total() {
        let pct = download_progress_percent(50, Some(100));
        assert!((pct.unwrap() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_unknown_or_zero_total() {
        assert!(download_progress_percent(50, None).is_none());
        assert!(download_progress_percent(50, Some(0)).is_none());
    }

    #[test]
    fn progress_capped_at_100() {
        let pct = download_progress_percent(200, Some(100));
        assert!((pct.unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn milestone_only_for_large_transfers() {
        let small = Some(PROGRESS_MIN_TOTAL_BYTES);
        assert!(!crosses_progress_milestone(0, PROGRESS_INTERVAL_BYTES, small));
        assert!(!crosses_progress_milestone(0, PROGRESS_INTERVAL_BYTES, None));
    }

    #[test]
    fn milestone_fires_once_per_interval() {
        let total = Some(100 * 1024 * 1024);
        let step = PROGRESS_INTERVAL_BYTES;
        assert!(!crosses_progress_milestone(0, step - 1, total));
        assert!(crosses_progress_milestone(step - 1, step, total));
        assert!(!crosses_progress_milestone(step, step + 8192, total));
        assert!(crosses_progress_milestone(step + 8192, 3 * step, total));
    }

    #[test]
    fn megabytes_conversion() {
        assert!((bytes_to_megabytes(5 * 1024 * 1024) - 5.0).abs() < f64::EPSILON);
    }
}
