//! Weights with irregular resolution rules.
//!
//! These are kept out of the manifest because each one carries its own host
//! and credential choice. The table is closed: it is consulted only after a
//! manifest lookup fails.

use crate::manifest::{FetchSpec, SourceProtocol};

/// Which configured bearer token a download should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialSlot {
    /// General-purpose HuggingFace token (`HF_TOKEN`).
    General,
    /// Token for private repositories (`HF_PRIVATE_TOKEN`).
    Private,
    /// No credential is sent.
    None,
}

impl CredentialSlot {
    /// Environment variable the credential is read from.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Self::General => Some("HF_TOKEN"),
            Self::Private => Some("HF_PRIVATE_TOKEN"),
            Self::None => None,
        }
    }
}

/// A weight resolved by its own rule rather than the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialWeight {
    pub identifier: &'static str,
    pub url: &'static str,
    pub dest: &'static str,
    pub protocol: SourceProtocol,
    pub credential: CredentialSlot,
}

impl SpecialWeight {
    /// View this weight as a regular fetch spec.
    pub fn fetch_spec(&self) -> FetchSpec {
        FetchSpec {
            url: self.url.to_string(),
            dest: self.dest.to_string(),
            source: self.protocol,
            license_restricted: false,
            file: None,
        }
    }
}

pub const SPECIAL_WEIGHTS: &[SpecialWeight] = &[
    SpecialWeight {
        identifier: "flux1-dev.safetensors",
        url: "https://huggingface.co/black-forest-labs/FLUX.1-dev/resolve/main/flux1-dev.safetensors",
        dest: "ComfyUI/models/unet",
        protocol: SourceProtocol::HuggingFace,
        credential: CredentialSlot::General,
    },
    SpecialWeight {
        identifier: "ae.safetensors",
        url: "https://huggingface.co/black-forest-labs/FLUX.1-dev/resolve/main/ae.safetensors",
        dest: "ComfyUI/models/vae",
        protocol: SourceProtocol::HuggingFace,
        credential: CredentialSlot::General,
    },
    SpecialWeight {
        identifier: "Kasabulibaas.safetensors",
        url: "https://huggingface.co/mvgeek/kasab/resolve/main/Kasabulibaas.safetensors",
        dest: "ComfyUI/models/loras",
        protocol: SourceProtocol::HuggingFace,
        credential: CredentialSlot::Private,
    },
    SpecialWeight {
        identifier: "flux_realism_lora.safetensors",
        url: "https://civitai.com/api/download/models/706528?type=Model&format=SafeTensor",
        dest: "ComfyUI/models/loras",
        protocol: SourceProtocol::Direct,
        credential: CredentialSlot::None,
    },
];

/// Find the special-case rule for a canonical identifier.
pub fn lookup(identifier: &str) -> Option<&'static SpecialWeight> {
    SPECIAL_WEIGHTS.iter().find(|w| w.identifier == identifier)
}
