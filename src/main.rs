// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use scan::Config;
use std::path::PathBuf;
use std::time::Duration;

mod cli;

#[derive(Parser)]
#[command(name = "scan")]
#[command(about = "Barcode and QR code scanner")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: <config dir>/scan/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a barcode from an image file
    Decode {
        /// Image file to decode
        image: PathBuf,

        /// Downsample towards this height before decoding
        #[arg(long)]
        target_height: Option<u32>,
    },

    /// Stream images through the live capture pipeline
    Watch {
        /// Image files or directories, streamed in name order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Sensor orientation of the simulated camera in degrees
        #[arg(short, long, default_value = "0")]
        orientation: u32,

        /// Seconds to wait for a barcode
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Number of barcodes to report before exiting
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Search the whole frame instead of the centred scan window
        #[arg(long)]
        full_frame: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the configuration file
        #[arg(short, long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=scan=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Decode {
            image,
            target_height,
        } => cli::decode_image(&config, &image, target_height),
        Commands::Watch {
            inputs,
            orientation,
            timeout,
            count,
            full_frame,
        } => cli::watch(
            config,
            &inputs,
            cli::WatchOptions {
                orientation,
                timeout: Duration::from_secs(timeout),
                count: count.max(1),
                full_frame,
            },
        ),
        Commands::Config { write } => cli::show_config(&config, cli.config, write),
    }
}
