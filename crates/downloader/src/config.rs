use std::path::PathBuf;
use std::time::Duration;

use cogflux_core::error::CoreError;
use cogflux_core::manifest::DEFAULT_MIRROR_BASE_URL;
use cogflux_core::special::CredentialSlot;

/// Bearer tokens read once at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    /// General-purpose HuggingFace token (`HF_TOKEN`).
    pub general: Option<String>,
    /// Token for the private repositories (`HF_PRIVATE_TOKEN`).
    pub private: Option<String>,
}

impl Credentials {
    pub fn for_slot(&self, slot: CredentialSlot) -> Option<&str> {
        match slot {
            CredentialSlot::General => self.general.as_deref(),
            CredentialSlot::Private => self.private.as_deref(),
            CredentialSlot::None => None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hint = |token: &Option<String>| {
            token
                .as_deref()
                .map(cogflux_core::download_manager::generate_token_hint)
        };
        f.debug_struct("Credentials")
            .field("general", &hint(&self.general))
            .field("private", &hint(&self.private))
            .finish()
    }
}

/// Downloader configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Root that relative manifest destinations are joined to.
    pub base_dir: PathBuf,
    /// Substituted for `{mirror}` in manifest URLs.
    pub mirror_base_url: String,
    /// External fetch-and-extract utility used for mirror archives.
    pub pget_bin: String,
    pub connect_timeout: Duration,
    /// Per-read timeout for HTTP bodies.
    pub read_timeout: Duration,
    /// Wall-clock limit for one mirror process.
    pub mirror_timeout: Duration,
    pub credentials: Credentials,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            mirror_base_url: DEFAULT_MIRROR_BASE_URL.to_string(),
            pget_bin: "pget".to_string(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(300),
            mirror_timeout: Duration::from_secs(3600),
            credentials: Credentials::default(),
        }
    }
}

impl DownloaderConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                         | Default                                                |
    /// |---------------------------------|--------------------------------------------------------|
    /// | `HF_TOKEN`                      | unset                                                  |
    /// | `HF_PRIVATE_TOKEN`              | unset                                                  |
    /// | `WEIGHTS_BASE_DIR`              | `.`                                                    |
    /// | `WEIGHTS_MIRROR_URL`            | `https://weights.replicate.delivery/default/comfy-ui`  |
    /// | `PGET_BIN`                      | `pget`                                                 |
    /// | `DOWNLOAD_CONNECT_TIMEOUT_SECS` | `30`                                                   |
    /// | `DOWNLOAD_READ_TIMEOUT_SECS`    | `300`                                                  |
    /// | `MIRROR_TIMEOUT_SECS`           | `3600`                                                 |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| -> Result<Duration, CoreError> {
            match get(key) {
                Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                    CoreError::Validation(format!("{key} must be a whole number of seconds, got '{raw}'"))
                }),
                None => Ok(default),
            }
        };

        Ok(Self {
            base_dir: get("WEIGHTS_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_dir),
            mirror_base_url: get("WEIGHTS_MIRROR_URL").unwrap_or(defaults.mirror_base_url),
            pget_bin: get("PGET_BIN").unwrap_or(defaults.pget_bin),
            connect_timeout: secs("DOWNLOAD_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            read_timeout: secs("DOWNLOAD_READ_TIMEOUT_SECS", defaults.read_timeout)?,
            mirror_timeout: secs("MIRROR_TIMEOUT_SECS", defaults.mirror_timeout)?,
            credentials: Credentials {
                general: get("HF_TOKEN"),
                private: get("HF_PRIVATE_TOKEN"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_empty() {
        let config = DownloaderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("."));
        assert_eq!(config.mirror_base_url, DEFAULT_MIRROR_BASE_URL);
        assert_eq!(config.pget_bin, "pget");
        assert_eq!(config.read_timeout, Duration::from_secs(300));
        assert!(config.credentials.general.is_none());
        assert!(config.credentials.private.is_none());
    }

    #[test]
    fn reads_overrides_and_tokens() {
        let config = DownloaderConfig::from_lookup(lookup(&[
            ("WEIGHTS_BASE_DIR", "/src"),
            ("HF_TOKEN", "hf_general"),
            ("HF_PRIVATE_TOKEN", "hf_private"),
            ("DOWNLOAD_CONNECT_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/src"));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.credentials.for_slot(CredentialSlot::General), Some("hf_general"));
        assert_eq!(config.credentials.for_slot(CredentialSlot::Private), Some("hf_private"));
        assert_eq!(config.credentials.for_slot(CredentialSlot::None), None);
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let config = DownloaderConfig::from_lookup(lookup(&[("HF_PRIVATE_TOKEN", "  ")])).unwrap();
        assert!(config.credentials.private.is_none());
    }

    #[test]
    fn invalid_timeout_rejected() {
        let result = DownloaderConfig::from_lookup(lookup(&[("MIRROR_TIMEOUT_SECS", "soon")]));
        assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("MIRROR_TIMEOUT_SECS"));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let creds = Credentials {
            general: Some("hf_secretvalue1234".to_string()),
            private: None,
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("secretvalue"));
        assert!(rendered.contains("...1234"));
    }
}
