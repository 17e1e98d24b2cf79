//! Weight manifest and resolver.
//!
//! The manifest maps every known weight identifier to where it can be
//! fetched from and where it must land on disk. It is built once at startup
//! from the embedded `data/weights.json` asset plus the generated
//! controlnet-aux table, and is read-only afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::download_manager::{supported_filetype, validate_filetype};
use crate::error::CoreError;
use crate::preprocessors::controlnet_aux_entries;

/// Placeholder in manifest URLs replaced by the configured mirror base URL.
pub const MIRROR_PLACEHOLDER: &str = "{mirror}";

/// Default self-hosted mirror serving `<identifier>.tar` archives.
pub const DEFAULT_MIRROR_BASE_URL: &str = "https://weights.replicate.delivery/default/comfy-ui";

/// Where licensing terms for restricted weights are documented.
pub const WEIGHTS_LICENSES_URL: &str =
    "https://github.com/replicate/cog-comfyui/blob/main/weights_licenses.md";

const EMBEDDED_MANIFEST: &str = include_str!("../data/weights.json");

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Protocol used to fetch a weight file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceProtocol {
    /// Tar archive served by the self-hosted mirror, fetched and extracted
    /// by an external utility.
    #[default]
    Mirror,
    /// Bearer-token authenticated HuggingFace blob download.
    HuggingFace,
    /// Plain unauthenticated HTTP download.
    Direct,
}

impl SourceProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mirror => "mirror",
            Self::HuggingFace => "huggingface",
            Self::Direct => "direct",
        }
    }
}

impl std::fmt::Display for SourceProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical file making up a weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
    /// Remote location of the file (or its tar archive for the mirror).
    pub url: String,
    /// Destination directory, or the full file path when it already ends
    /// with the file name.
    pub dest: String,
    /// Fetch protocol. Absent in the data means the mirror.
    #[serde(default)]
    pub source: SourceProtocol,
    /// Weight is published under a non-commercial licence.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub license_restricted: bool,
    /// Physical file name when it differs from the weight identifier
    /// (bundles that pull in auxiliary files).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl FetchSpec {
    /// Name of the file this spec produces for the given weight identifier.
    pub fn file_name<'a>(&'a self, identifier: &'a str) -> &'a str {
        self.file.as_deref().unwrap_or(identifier)
    }

    pub fn dest_path(&self) -> &Path {
        Path::new(&self.dest)
    }
}

/// Manifest entry: a weight is either one file or an ordered bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestEntry {
    Single(FetchSpec),
    Multiple(Vec<FetchSpec>),
}

impl ManifestEntry {
    /// All fetch specs of this entry, in declaration order.
    pub fn specs(&self) -> &[FetchSpec] {
        match self {
            Self::Single(spec) => std::slice::from_ref(spec),
            Self::Multiple(specs) => specs,
        }
    }

    pub fn is_license_restricted(&self) -> bool {
        self.specs().iter().any(|spec| spec.license_restricted)
    }
}

/// A successful manifest lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWeight<'a> {
    /// Canonical identifier (after normalisation and aliasing).
    pub identifier: &'a str,
    pub entry: &'a ManifestEntry,
}

/// Raw shape of the manifest data asset.
#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    weights: BTreeMap<String, ManifestEntry>,
}

/// Immutable weight manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    weights: BTreeMap<String, ManifestEntry>,
    aliases: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl Manifest {
    /// Build the manifest shipped with the crate, pointing mirror URLs at
    /// `mirror_base_url`.
    pub fn embedded(mirror_base_url: &str) -> Result<Self, CoreError> {
        Self::from_json(EMBEDDED_MANIFEST, mirror_base_url)
    }

    /// Build a manifest from a JSON document in the `weights.json` format.
    ///
    /// The controlnet-aux auxiliary models are always included; entries in
    /// the document override generated ones with the same identifier.
    pub fn from_json(json: &str, mirror_base_url: &str) -> Result<Self, CoreError> {
        let file: ManifestFile = serde_json::from_str(json)
            .map_err(|e| CoreError::Internal(format!("Failed to parse weight manifest: {e}")))?;

        let mirror = mirror_base_url.trim_end_matches('/');
        let mut weights: BTreeMap<String, ManifestEntry> =
            controlnet_aux_entries(mirror).into_iter().collect();

        for (identifier, mut entry) in file.weights {
            match &mut entry {
                ManifestEntry::Single(spec) => expand_mirror(spec, mirror),
                ManifestEntry::Multiple(specs) => {
                    if specs.is_empty() {
                        return Err(CoreError::Validation(format!(
                            "Manifest entry '{identifier}' has an empty file list"
                        )));
                    }
                    specs.iter_mut().for_each(|spec| expand_mirror(spec, mirror));
                }
            }
            weights.insert(identifier, entry);
        }

        for identifier in weights.keys() {
            if supported_filetype(identifier).is_none() {
                return Err(CoreError::Validation(format!(
                    "Manifest entry '{identifier}' does not have a supported filetype"
                )));
            }
        }

        for (alias, target) in &file.aliases {
            if !weights.contains_key(target) {
                return Err(CoreError::Validation(format!(
                    "Alias '{alias}' points at unknown weight '{target}'"
                )));
            }
        }

        Ok(Self {
            weights,
            aliases: file.aliases,
        })
    }
}

fn expand_mirror(spec: &mut FetchSpec, mirror: &str) {
    if spec.url.contains(MIRROR_PLACEHOLDER) {
        spec.url = spec.url.replace(MIRROR_PLACEHOLDER, mirror);
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

impl Manifest {
    /// Normalise a user-supplied identifier to its canonical form.
    ///
    /// Trims whitespace, converts Windows separators, then applies the
    /// alias table.
    pub fn canonical_identifier(&self, identifier: &str) -> String {
        let normalized = identifier.trim().replace('\\', "/");
        match self.aliases.get(&normalized) {
            Some(target) => target.clone(),
            None => normalized,
        }
    }

    /// Look up an identifier, returning `None` when it is not in the manifest.
    pub fn lookup(&self, identifier: &str) -> Option<ResolvedWeight<'_>> {
        let canonical = self.canonical_identifier(identifier);
        self.weights
            .get_key_value(&canonical)
            .map(|(identifier, entry)| ResolvedWeight {
                identifier: identifier.as_str(),
                entry,
            })
    }

    /// Resolve an identifier to its manifest entry.
    ///
    /// Empty identifiers are a validation error; unknown identifiers are
    /// [`CoreError::UnresolvableWeight`].
    pub fn resolve(&self, identifier: &str) -> Result<ResolvedWeight<'_>, CoreError> {
        if identifier.trim().is_empty() {
            return Err(CoreError::Validation(
                "Weight identifier must not be empty".to_string(),
            ));
        }
        self.lookup(identifier)
            .ok_or_else(|| CoreError::unresolvable(identifier.trim()))
    }

    /// Whether any file of the weight carries a non-commercial licence.
    ///
    /// Unknown identifiers are not restricted.
    pub fn is_license_restricted(&self, identifier: &str) -> bool {
        self.lookup(identifier)
            .map(|resolved| resolved.entry.is_license_restricted())
            .unwrap_or(false)
    }

    /// All identifiers whose filetype is `filetype`, sorted.
    ///
    /// `filetype` must be one of the supported extensions.
    pub fn get_by_type(&self, filetype: &str) -> Result<Vec<&str>, CoreError> {
        let ext = validate_filetype(filetype)?;
        Ok(self
            .weights
            .keys()
            .filter(|identifier| supported_filetype(identifier) == Some(ext))
            .map(String::as_str)
            .collect())
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
