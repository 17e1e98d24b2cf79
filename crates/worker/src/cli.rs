use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cogflux_core::workflow::Resolution;

/// cogflux weight acquisition and workflow runner
#[derive(Debug, Parser)]
#[command(name = "cogflux-worker")]
#[command(about = "Fetch model weights for a ComfyUI deployment and run its workflow")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Make sure weights are on disk, downloading whatever is missing
    Fetch {
        /// Weight identifiers to fetch
        weights: Vec<String>,
        /// Also fetch every weight the workflow references or implies
        #[arg(short, long)]
        workflow: Option<PathBuf>,
    },
    /// List the weights the manifest can resolve
    List {
        /// Only list weights with this extension (e.g. `.safetensors`)
        #[arg(short, long)]
        filetype: Option<String>,
    },
    /// Remove a weight's files from disk
    Delete {
        /// Weight identifier to remove
        weight: String,
    },
    /// Fetch weights, submit the workflow to ComfyUI and wait for outputs
    Run(RunArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// API-format workflow JSON
    #[arg(short, long, default_value = "workflow_api.json")]
    pub workflow: PathBuf,

    #[arg(long, default_value = "Love, at night on the beach, dancing, unity, happiness.")]
    pub prompt: String,

    #[arg(
        long,
        default_value = "deformed hands, extra fingers, missing fingers, fused fingers, too many fingers, mutated hands, disproportionate hands"
    )]
    pub negative_prompt: String,

    /// One of 512x768, 768x1280, 1024x1024, 1024x1536
    #[arg(long, default_value = "768x1280")]
    pub resolution: Resolution,

    /// Sampling steps for the main scheduler
    #[arg(long, default_value_t = 55, value_parser = clap::value_parser!(u32).range(20..=100))]
    pub steps: u32,

    /// Random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Extra weights to fetch before submitting
    #[arg(long = "weight")]
    pub weights: Vec<String>,

    #[arg(long, env = "COMFYUI_URL", default_value = "http://127.0.0.1:8188")]
    pub comfyui_url: String,

    /// Give up waiting for outputs after this many seconds
    #[arg(long, default_value_t = 1800)]
    pub timeout_secs: u64,

    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["cogflux-worker", "run"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("Expected Run");
        };
        assert_eq!(args.resolution, Resolution::Portrait768x1280);
        assert_eq!(args.steps, 55);
        assert!(args.seed.is_none());
        assert_eq!(args.workflow, PathBuf::from("workflow_api.json"));
    }

    #[test]
    fn steps_out_of_range_rejected() {
        let result = Cli::try_parse_from(["cogflux-worker", "run", "--steps", "5"]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_resolution_rejected() {
        let result = Cli::try_parse_from(["cogflux-worker", "run", "--resolution", "640x480"]);
        assert!(result.is_err());
    }

    #[test]
    fn fetch_collects_weights() {
        let cli = Cli::try_parse_from([
            "cogflux-worker",
            "fetch",
            "clip_l.safetensors",
            "ae.safetensors",
            "--workflow",
            "wf.json",
        ])
        .unwrap();
        let Command::Fetch { weights, workflow } = cli.command else {
            panic!("Expected Fetch");
        };
        assert_eq!(weights, vec!["clip_l.safetensors", "ae.safetensors"]);
        assert_eq!(workflow, Some(PathBuf::from("wf.json")));
    }
}
