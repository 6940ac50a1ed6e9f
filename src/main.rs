// SPDX-License-Identifier: GPL-3.0-only

use capture_preview::Config;
use capture_preview::backends::camera::Resolution;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "capture-preview")]
#[command(about = "Live preview and audio loopback for USB capture cards")]
#[command(version = capture_preview::constants::app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live session (default)
    Run {
        /// Do not loop captured audio back to an output
        #[arg(long)]
        no_audio: bool,

        /// Preferred preview size, e.g. 1280x720
        #[arg(short, long)]
        resolution: Option<Resolution>,

        /// Device node of a picture-in-picture camera, e.g. /dev/video0
        #[arg(long)]
        pip: Option<PathBuf>,
    },

    /// List attached capture devices
    List,

    /// Show the sizes a capture device offers and the format it would use
    Formats {
        /// Device node (default: first capture device)
        #[arg(short, long)]
        device: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    // Set RUST_LOG to override the configured filter
    // Examples: RUST_LOG=debug, RUST_LOG=capture_preview=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List) => cli::list_devices(),
        Some(Commands::Formats { device }) => cli::show_formats(&config, device),
        Some(Commands::Run {
            no_audio,
            resolution,
            pip,
        }) => cli::run_session(
            config,
            cli::RunOptions {
                no_audio,
                resolution,
                pip,
            },
        ),
        None => cli::run_session(config, cli::RunOptions::default()),
    }
}
