//! Weight acquisition orchestrator.
//!
//! For each requested identifier: resolve it (manifest first, then the
//! special-case table), surface advisories, skip files already on disk and
//! fetch the rest through the strategy for their protocol. Weights are
//! processed sequentially; the first failure aborts the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cogflux_core::download_manager::{
    bytes_to_megabytes, destination_path, generate_token_hint, validate_requested_weights,
};
use cogflux_core::error::CoreError;
use cogflux_core::manifest::{FetchSpec, Manifest, SourceProtocol, WEIGHTS_LICENSES_URL};
use cogflux_core::special::{self, CredentialSlot};

use crate::config::{Credentials, DownloaderConfig};
use crate::error::DownloadError;
use crate::mirror::remove_path;
use crate::strategy::Strategies;
use crate::task::DownloadTask;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Non-fatal condition surfaced before a download proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// Weight is published under a non-commercial licence.
    LicenseRestricted { identifier: String },
    /// The credential the weight's host expects is not configured.
    MissingCredential {
        identifier: String,
        env_var: &'static str,
    },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LicenseRestricted { identifier } => write!(
                f,
                "{identifier} is restricted to non-commercial use. See {WEIGHTS_LICENSES_URL}"
            ),
            Self::MissingCredential {
                identifier,
                env_var,
            } => write!(
                f,
                "{env_var} is not set; attempting {identifier} without authentication"
            ),
        }
    }
}

/// One step of an acquisition, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    Advisory(Advisory),
    /// File already present; no network attempt was made.
    Skipped { identifier: String, path: PathBuf },
    Downloaded {
        identifier: String,
        path: PathBuf,
        protocol: SourceProtocol,
        bytes: u64,
        elapsed: Duration,
    },
}

/// Ordered record of a successful acquisition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionReport {
    pub events: Vec<AcquisitionEvent>,
}

impl AcquisitionReport {
    pub fn advisories(&self) -> impl Iterator<Item = &Advisory> {
        self.events.iter().filter_map(|event| match event {
            AcquisitionEvent::Advisory(advisory) => Some(advisory),
            _ => None,
        })
    }

    pub fn downloaded(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AcquisitionEvent::Downloaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AcquisitionEvent::Skipped { .. }))
            .count()
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.events
            .iter()
            .map(|e| match e {
                AcquisitionEvent::Downloaded { bytes, .. } => *bytes,
                _ => 0,
            })
            .sum()
    }

    fn extend(&mut self, other: AcquisitionReport) {
        self.events.extend(other.events);
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// A resolved weight, ready to acquire.
#[derive(Debug, Clone)]
struct WeightPlan {
    identifier: String,
    specs: Vec<FetchSpec>,
    /// Explicit credential from the special-case table. Manifest entries
    /// derive theirs from each spec's protocol.
    credential: Option<CredentialSlot>,
    license_restricted: bool,
}

impl WeightPlan {
    fn credential_for(&self, spec: &FetchSpec) -> CredentialSlot {
        self.credential.unwrap_or(match spec.source {
            SourceProtocol::HuggingFace => CredentialSlot::General,
            SourceProtocol::Mirror | SourceProtocol::Direct => CredentialSlot::None,
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct WeightsDownloader {
    manifest: Arc<Manifest>,
    base_dir: PathBuf,
    credentials: Credentials,
    strategies: Strategies,
    /// One lock per destination file, held across the existence check and
    /// the write.
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl WeightsDownloader {
    /// Build an orchestrator with the production strategies.
    pub fn new(manifest: Arc<Manifest>, config: &DownloaderConfig) -> Result<Self, DownloadError> {
        let strategies = Strategies::from_config(config)?;

        match config.credentials.general.as_deref() {
            Some(token) => tracing::info!(hint = %generate_token_hint(token), "Using HF_TOKEN"),
            None => tracing::warn!("HF_TOKEN is not set; gated HuggingFace downloads will fail"),
        }
        if let Some(token) = config.credentials.private.as_deref() {
            tracing::info!(hint = %generate_token_hint(token), "Using HF_PRIVATE_TOKEN");
        }

        Ok(Self::with_strategies(
            manifest,
            config.base_dir.clone(),
            config.credentials.clone(),
            strategies,
        ))
    }

    pub fn with_strategies(
        manifest: Arc<Manifest>,
        base_dir: impl Into<PathBuf>,
        credentials: Credentials,
        strategies: Strategies,
    ) -> Self {
        Self {
            manifest,
            base_dir: base_dir.into(),
            credentials,
            strategies,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Make sure every file of one weight is on disk.
    pub async fn ensure_present(&self, identifier: &str) -> Result<AcquisitionReport, DownloadError> {
        validate_requested_weights(&[identifier])?;
        let plan = self.plan(identifier)?;
        self.acquire(&plan).await
    }

    /// Make sure every requested weight is on disk, in request order.
    ///
    /// All identifiers are validated and resolved before anything is
    /// fetched. Duplicates (after canonicalisation) are acquired once. The
    /// first transfer failure aborts the batch.
    pub async fn ensure_all<S: AsRef<str>>(
        &self,
        identifiers: &[S],
    ) -> Result<AcquisitionReport, DownloadError> {
        validate_requested_weights(identifiers)?;

        let mut plans: Vec<WeightPlan> = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            let plan = self.plan(identifier.as_ref())?;
            if !plans.iter().any(|p| p.identifier == plan.identifier) {
                plans.push(plan);
            }
        }

        let start = Instant::now();
        let mut report = AcquisitionReport::default();
        for plan in &plans {
            report.extend(self.acquire(plan).await?);
        }

        tracing::info!(
            weights = plans.len(),
            downloaded = report.downloaded(),
            skipped = report.skipped(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Weights ready",
        );
        Ok(report)
    }

    /// Remove every file of a weight from disk. Returns the paths removed.
    pub async fn delete_weights(&self, identifier: &str) -> Result<Vec<PathBuf>, DownloadError> {
        let plan = self.plan(identifier)?;
        let mut removed = Vec::new();
        for spec in &plan.specs {
            let path = self.destination_for(&plan.identifier, spec);
            let lock = self.lock_for(&path);
            let existed = {
                let _guard = lock.lock().await;
                let existed = tokio::fs::symlink_metadata(&path).await.is_ok();
                if existed {
                    remove_path(&path).await;
                    tracing::info!(identifier = %plan.identifier, dest = %path.display(), "Deleted weight");
                }
                existed
            };
            self.release_lock(&path, lock);
            if existed {
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Resolve an identifier: manifest first, then the special-case table.
    fn plan(&self, identifier: &str) -> Result<WeightPlan, CoreError> {
        if let Some(resolved) = self.manifest.lookup(identifier) {
            return Ok(WeightPlan {
                identifier: resolved.identifier.to_string(),
                specs: resolved.entry.specs().to_vec(),
                credential: None,
                license_restricted: resolved.entry.is_license_restricted(),
            });
        }

        let canonical = self.manifest.canonical_identifier(identifier);
        if canonical.is_empty() {
            return Err(CoreError::Validation(
                "Weight identifier must not be empty".to_string(),
            ));
        }
        match special::lookup(&canonical) {
            Some(weight) => Ok(WeightPlan {
                identifier: canonical,
                specs: vec![weight.fetch_spec()],
                credential: Some(weight.credential),
                license_restricted: false,
            }),
            None => Err(CoreError::unresolvable(canonical)),
        }
    }

    fn destination_for(&self, identifier: &str, spec: &FetchSpec) -> PathBuf {
        let dest = self.base_dir.join(spec.dest_path());
        destination_path(spec.file_name(identifier), &dest)
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Drop the map entry for `path` once no other caller holds or awaits it.
    fn release_lock(&self, path: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(path);
        }
    }

    async fn acquire(&self, plan: &WeightPlan) -> Result<AcquisitionReport, DownloadError> {
        let mut report = AcquisitionReport::default();

        if plan.license_restricted {
            let advisory = Advisory::LicenseRestricted {
                identifier: plan.identifier.clone(),
            };
            tracing::warn!(identifier = %plan.identifier, "{advisory}");
            report.events.push(AcquisitionEvent::Advisory(advisory));
        }

        for spec in &plan.specs {
            let path = self.destination_for(&plan.identifier, spec);
            let lock = self.lock_for(&path);
            let result = {
                let _guard = lock.lock().await;
                self.acquire_file(plan, spec, path.clone(), &mut report).await
            };
            self.release_lock(&path, lock);
            result?;
        }

        Ok(report)
    }

    /// Acquire one destination file. The caller holds its lock.
    async fn acquire_file(
        &self,
        plan: &WeightPlan,
        spec: &FetchSpec,
        path: PathBuf,
        report: &mut AcquisitionReport,
    ) -> Result<(), DownloadError> {
        if tokio::fs::try_exists(&path).await? {
            tracing::info!(identifier = %plan.identifier, dest = %path.display(), "Weight already present");
            report.events.push(AcquisitionEvent::Skipped {
                identifier: plan.identifier.clone(),
                path,
            });
            return Ok(());
        }

        let slot = plan.credential_for(spec);
        let token = self.credentials.for_slot(slot).map(str::to_string);
        if let (Some(env_var), None) = (slot.env_var(), token.as_ref()) {
            let advisory = Advisory::MissingCredential {
                identifier: plan.identifier.clone(),
                env_var,
            };
            tracing::warn!(identifier = %plan.identifier, "{advisory}");
            report.events.push(AcquisitionEvent::Advisory(advisory));
        }

        let task = DownloadTask {
            identifier: plan.identifier.clone(),
            url: spec.url.clone(),
            destination: path,
            protocol: spec.source,
            token,
        };
        report.events.push(self.fetch(task).await?);
        Ok(())
    }

    async fn fetch(&self, task: DownloadTask) -> Result<AcquisitionEvent, DownloadError> {
        tracing::info!(
            identifier = %task.identifier,
            dest = %task.destination.display(),
            protocol = %task.protocol,
            "Downloading weight",
        );

        let start = Instant::now();
        let strategy = self.strategies.for_protocol(task.protocol);
        let written = match strategy.fetch(&task).await {
            Ok(path) => path,
            Err(source) => {
                remove_path(&task.destination).await;
                tracing::error!(identifier = %task.identifier, error = %source, "Download failed");
                return Err(DownloadError::Transfer {
                    identifier: task.identifier,
                    source,
                });
            }
        };
        let elapsed = start.elapsed();

        let bytes = match tokio::fs::metadata(&written).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };
        tracing::info!(
            identifier = %task.identifier,
            dest = %written.display(),
            bytes,
            size_mb = %format!("{:.2}", bytes_to_megabytes(bytes)),
            elapsed_ms = elapsed.as_millis() as u64,
            "Downloaded weight",
        );

        Ok(AcquisitionEvent::Downloaded {
            identifier: task.identifier,
            path: written,
            protocol: task.protocol,
            bytes,
            elapsed,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
