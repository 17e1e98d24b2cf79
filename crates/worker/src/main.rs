//! `cogflux-worker` -- weight fetcher and workflow runner.
//!
//! # Environment variables
//!
//! | Variable                        | Default                                               | Description                              |
//! |---------------------------------|-------------------------------------------------------|------------------------------------------|
//! | `HF_TOKEN`                      | --                                                    | HuggingFace bearer token                 |
//! | `HF_PRIVATE_TOKEN`              | --                                                    | Token for private repositories           |
//! | `WEIGHTS_BASE_DIR`              | `.`                                                   | Root for relative weight destinations    |
//! | `WEIGHTS_MIRROR_URL`            | `https://weights.replicate.delivery/default/comfy-ui` | Tarball mirror base URL                  |
//! | `PGET_BIN`                      | `pget`                                                | Mirror fetch-and-extract utility         |
//! | `DOWNLOAD_CONNECT_TIMEOUT_SECS` | `30`                                                  | HTTP connect timeout                     |
//! | `DOWNLOAD_READ_TIMEOUT_SECS`    | `300`                                                 | HTTP read timeout                        |
//! | `MIRROR_TIMEOUT_SECS`           | `3600`                                                | Wall-clock limit per mirror fetch        |
//! | `COMFYUI_URL`                   | `http://127.0.0.1:8188`                               | ComfyUI endpoint (`run` only)            |
//! | `LOG_FORMAT`                    | text                                                  | `json` for JSON log lines                |

use clap::Parser;

use cogflux_worker::cli::Cli;
use cogflux_worker::commands;
use cogflux_worker::logging::{self, LogFormat};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    logging::init(LogFormat::from_env_value(
        std::env::var("LOG_FORMAT").ok().as_deref(),
    ));

    let cli = Cli::parse();

    if let Err(e) = commands::execute(cli).await {
        tracing::error!(error = %format!("{e:#}"), "cogflux-worker failed");
        std::process::exit(1);
    }
}
