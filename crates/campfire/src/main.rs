//! campfire CLI: run a simulated jam or inspect configuration.

mod jam;

use std::path::PathBuf;

use anyhow::{Context, Result};
use campconf::CampConfig;
use clap::{Parser, Subcommand};

/// Turn-based collaborative loop sessions
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of ./campfire.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate a session of bot composers over an in-process relay
    Jam {
        /// Number of peers to seat
        #[arg(short, long, default_value = "3")]
        peers: usize,

        /// How long to play, in seconds
        #[arg(short, long, default_value = "60")]
        seconds: u64,

        /// Override the configured tempo
        #[arg(long)]
        bpm: Option<f64>,

        /// Override the configured window length in loop cycles
        #[arg(long)]
        cycles: Option<u32>,

        /// Print the final session state as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = CampConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml());
            println!();
            println!("# Sources");
            if sources.files.is_empty() {
                println!("#   (no config files, compiled defaults)");
            }
            for file in &sources.files {
                println!("#   file: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("#   env:  {}", var);
            }
            Ok(())
        }
        Command::Jam {
            peers,
            seconds,
            bpm,
            cycles,
            json,
        } => {
            if let Some(bpm) = bpm {
                config.bootstrap.session.bpm = bpm;
            }
            if let Some(cycles) = cycles {
                config.bootstrap.session.window_cycles = cycles;
            }

            let guard = campfire::telemetry::init(&config.infra.telemetry)
                .context("Failed to initialize telemetry")?;
            let duration = std::time::Duration::from_secs(seconds);
            let result = jam::run(&config, peers, duration, json).await;
            guard.shutdown();
            result
        }
    }
}
