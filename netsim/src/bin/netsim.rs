//! Command-line runner: simulate a topology snapshot and print the result.
//!
//! # Usage
//!
//! ```bash
//! netsim --topology topology.json --scenario day2 --seed 42 --output result.json
//! ```
//!
//! The topology file holds the `devices` and `links` lists produced by the
//! parsing and discovery stages. `RUST_LOG` overrides the log filter.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use netsim::{NetworkSimulator, SimulationConfig, SimulationError, SimulationReport, Topology};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "netsim")]
#[command(about = "Simulate startup, failure and recovery of a discovered network", long_about = None)]
struct Args {
    /// Topology JSON file (devices and links)
    #[arg(short, long)]
    topology: PathBuf,

    /// Scenario to run: day1 (startup/discovery) or day2 (failure/recovery)
    #[arg(short, long, default_value = "day1")]
    scenario: String,

    /// Simulation config JSON file; missing fields take defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for every random choice (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// Write the result record as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = match args.verbose {
        0 => "info",
        1 => "info,netsim=debug",
        _ => "debug,netsim=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(args).await {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "simulation failed");
            eprintln!("error: {err}");
            if err.is_configuration_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(args: Args) -> Result<SimulationReport, SimulationError> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    let topology = Topology::from_json_file(&args.topology)?;
    tracing::info!(
        devices = topology.devices.len(),
        links = topology.links.len(),
        scenario = %args.scenario,
        "loaded topology"
    );

    let report = NetworkSimulator::new(config)
        .run(&topology, &args.scenario)
        .await?;

    if let Some(path) = &args.output {
        let json = report.to_json()?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "result written");
    }
    Ok(report)
}
