use std::path::{Path, PathBuf};

use cogflux_core::download_manager::generate_token_hint;
use cogflux_core::manifest::SourceProtocol;

/// One physical file to fetch.
#[derive(Clone)]
pub struct DownloadTask {
    /// Weight identifier this file belongs to (for logs and errors).
    pub identifier: String,
    pub url: String,
    /// Full path of the file once written.
    pub destination: PathBuf,
    pub protocol: SourceProtocol,
    /// Bearer token to present, if any.
    pub token: Option<String>,
}

impl DownloadTask {
    /// Directory the file lands in; created before fetching.
    pub fn destination_dir(&self) -> &Path {
        self.destination.parent().unwrap_or(self.destination.as_path())
    }

    /// Sibling path the HTTP strategies stream into before the final rename.
    pub fn staging_path(&self) -> PathBuf {
        let mut name = self
            .destination
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        self.destination.with_file_name(name)
    }
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask")
            .field("identifier", &self.identifier)
            .field("url", &self.url)
            .field("destination", &self.destination)
            .field("protocol", &self.protocol)
            .field("token", &self.token.as_deref().map(generate_token_hint))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(destination: &str, token: Option<&str>) -> DownloadTask {
        DownloadTask {
            identifier: "clip_l.safetensors".to_string(),
            url: "https://hf.test/clip_l.safetensors".to_string(),
            destination: PathBuf::from(destination),
            protocol: SourceProtocol::HuggingFace,
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn destination_dir_is_parent() {
        let t = task("/w/ComfyUI/models/clip/clip_l.safetensors", None);
        assert_eq!(t.destination_dir(), Path::new("/w/ComfyUI/models/clip"));
    }

    #[test]
    fn staging_path_appends_part_suffix() {
        let t = task("/w/clip/clip_l.safetensors", None);
        assert_eq!(t.staging_path(), PathBuf::from("/w/clip/clip_l.safetensors.part"));
    }

    #[test]
    fn debug_redacts_token() {
        let t = task("/w/clip_l.safetensors", Some("hf_abcdefghwxyz"));
        let rendered = format!("{t:?}");
        assert!(!rendered.contains("hf_abcdefgh"));
        assert!(rendered.contains("...wxyz"));
    }
}
