//! parkd — the ParkGrid daemon.
//!
//! Assembles the control loop in one process:
//! - knowledge store (redb)
//! - in-process pub/sub broker
//! - outbox dispatcher
//! - coordinator driving the simulated lots
//!
//! # Usage
//!
//! ```text
//! parkd run --config config/parkgrid.toml --data-dir /var/lib/parkgrid
//! parkd check --config config/parkgrid.toml
//! ```

mod daemon;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use parkgrid_core::ParkConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,parkd=debug,parkgrid=debug";

#[derive(Parser)]
#[command(name = "parkd", about = "ParkGrid adaptive parking daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until Ctrl-C (or the tick limit).
    Run {
        /// Path to parkgrid.toml.
        #[arg(long)]
        config: PathBuf,

        /// Directory holding the knowledge store.
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Stop after this many ticks.
        #[arg(long)]
        ticks: Option<u64>,

        /// Override the simulation seed from the config.
        #[arg(long)]
        seed: Option<u64>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Validate a config file and print the effective settings.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            ticks,
            seed,
            log_json,
        } => {
            init_tracing(log_json);
            let mut park = load(&config)?;
            if seed.is_some() {
                park.simulation.seed = seed;
            }
            daemon::run(park, data_dir, ticks).await
        }
        Command::Check { config } => {
            init_tracing(false);
            let park = load(&config)?;
            print!("{}", summary(&park)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(path: &std::path::Path) -> anyhow::Result<ParkConfig> {
    ParkConfig::load(path).with_context(|| format!("invalid configuration {}", path.display()))
}

fn summary(config: &ParkConfig) -> anyhow::Result<String> {
    let mut out = format!("configuration OK: {} lot(s)\n", config.lots.len());
    for lot in &config.lots {
        out.push_str(&format!(
            "  {:<12} {:<20} capacity {:>5}  price {:.2} [{:.2}, {:.2}]\n",
            lot.id,
            lot.display_name(),
            lot.total_capacity,
            lot.base_price,
            lot.min_price,
            lot.max_price
        ));
    }
    out.push('\n');
    out.push_str(&toml::to_string_pretty(config)?);
    Ok(out)
}
