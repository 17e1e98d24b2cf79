//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use cogflux_comfyui::api::ComfyUIApi;
use cogflux_core::manifest::Manifest;
use cogflux_core::workflow::{
    apply_generation_params, parse_workflow, requested_weights, GenerationParams,
};
use cogflux_downloader::{AcquisitionReport, DownloaderConfig, WeightsDownloader};

use crate::cli::{Cli, Command, RunArgs};

/// Weights the deployed workflow always needs, whether or not its graph
/// names them.
pub const DEFAULT_WEIGHTS: &[&str] = &[
    "flux1-dev.safetensors",
    "flux_realism_lora.safetensors",
    "Kasabulibaas.safetensors",
    "ae.safetensors",
    "t5xxl_fp16.safetensors",
    "clip_l.safetensors",
    "hand_yolov8s.pt",
    "face_yolov8m.pt",
    "Eyeful_v2-Paired.pt",
    "sam_vit_b_01ec64.pth",
    "Presetpro - Portra 800.cube",
];

/// Parse the CLI's subcommand and run it against the environment config.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = DownloaderConfig::from_env().context("Invalid downloader configuration")?;
    let manifest = Arc::new(
        Manifest::embedded(&config.mirror_base_url).context("Failed to load weight manifest")?,
    );

    match cli.command {
        Command::List { filetype } => {
            for identifier in list_weights(&manifest, filetype.as_deref())? {
                println!("{identifier}");
            }
        }
        Command::Fetch { weights, workflow } => {
            let workflow = workflow.as_deref().map(load_workflow).transpose()?;
            let weights = weights_to_fetch(&weights, workflow.as_ref())?;
            let downloader = WeightsDownloader::new(manifest, &config)?;
            let report = downloader.ensure_all(&weights).await?;
            log_report(&report);
        }
        Command::Delete { weight } => {
            let downloader = WeightsDownloader::new(manifest, &config)?;
            let removed = downloader.delete_weights(&weight).await?;
            if removed.is_empty() {
                tracing::info!(identifier = %weight, "Weight not present on disk");
            }
        }
        Command::Run(args) => {
            let downloader = WeightsDownloader::new(manifest, &config)?;
            run_workflow(&downloader, &args).await?;
        }
    }
    Ok(())
}

/// Identifiers the manifest can resolve, optionally filtered by extension.
pub fn list_weights(manifest: &Manifest, filetype: Option<&str>) -> anyhow::Result<Vec<String>> {
    let identifiers: Vec<String> = match filetype {
        Some(filetype) => manifest
            .get_by_type(filetype)?
            .into_iter()
            .map(str::to_string)
            .collect(),
        None => manifest.identifiers().map(str::to_string).collect(),
    };
    Ok(identifiers)
}

pub fn load_workflow(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Workflow {} is not valid JSON", path.display()))
}

/// Weights a `fetch` needs: the explicit list plus everything the workflow
/// references or implies. With neither, the deployment defaults.
pub fn weights_to_fetch(
    explicit: &[String],
    workflow: Option<&serde_json::Value>,
) -> anyhow::Result<Vec<String>> {
    match workflow {
        Some(workflow) => {
            let nodes = parse_workflow(workflow)?;
            Ok(requested_weights(explicit, &nodes))
        }
        None if explicit.is_empty() => Ok(DEFAULT_WEIGHTS.iter().map(|w| w.to_string()).collect()),
        None => Ok(explicit.to_vec()),
    }
}

pub fn generation_params(args: &RunArgs) -> GenerationParams {
    GenerationParams {
        prompt: args.prompt.clone(),
        negative_prompt: args.negative_prompt.clone(),
        resolution: args.resolution,
        steps: args.steps,
        seed: args.seed.unwrap_or_else(|| u64::from(rand::random::<u32>())),
    }
}

/// Collect the weights a run needs from the workflow template, then splice
/// `params` into it. Weights are read before the user's text is written.
pub fn prepare_run(
    workflow: &mut serde_json::Value,
    params: &GenerationParams,
    extra_weights: &[String],
) -> anyhow::Result<Vec<String>> {
    let mut explicit: Vec<String> = DEFAULT_WEIGHTS.iter().map(|w| w.to_string()).collect();
    explicit.extend(extra_weights.iter().cloned());
    let weights = weights_to_fetch(&explicit, Some(workflow))?;

    let updated = apply_generation_params(workflow, params)?;
    tracing::debug!(nodes = ?updated, "Applied generation parameters");
    Ok(weights)
}

async fn run_workflow(downloader: &WeightsDownloader, args: &RunArgs) -> anyhow::Result<()> {
    let mut workflow = load_workflow(&args.workflow)?;
    let params = generation_params(args);
    tracing::info!(
        prompt = %params.prompt,
        steps = params.steps,
        seed = params.seed,
        resolution = params.resolution.as_str(),
        "Generating",
    );

    let weights = prepare_run(&mut workflow, &params, &args.weights)?;
    let report = downloader.ensure_all(&weights).await?;
    log_report(&report);

    let api = ComfyUIApi::new(args.comfyui_url.as_str());
    let client_id = uuid::Uuid::new_v4().to_string();
    let submitted = api
        .submit_workflow(&workflow, &client_id)
        .await
        .context("ComfyUI rejected the workflow")?;
    tracing::info!(prompt_id = %submitted.prompt_id, queue_position = submitted.number, "Workflow queued");

    let outputs = api
        .wait_for_outputs(
            &submitted.prompt_id,
            Duration::from_millis(args.poll_interval_ms),
            Duration::from_secs(args.timeout_secs),
        )
        .await?;
    for file in outputs {
        println!("{}", file.relative_path());
    }
    Ok(())
}

fn log_report(report: &AcquisitionReport) {
    for advisory in report.advisories() {
        tracing::debug!(%advisory, "Advisory");
    }
    tracing::info!(
        downloaded = report.downloaded(),
        skipped = report.skipped(),
        bytes = report.bytes_downloaded(),
        "Weight acquisition finished",
    );
}
