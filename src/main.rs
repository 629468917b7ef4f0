//! # Main — CLI Entry Point
//!
//! Routes subcommands to the three fleet roles plus two single-process
//! conveniences:
//!
//! - `coordinator`: owns the number, assigns workers, writes the results.
//! - `worker`: joins a coordinator; the first four also host a dispatcher.
//! - `start`: operator trigger, sends `start` to a waiting coordinator.
//! - `local`: coordinator plus N workers in this process over loopback TCP.
//! - `race`: all four algorithms on the rayon pool, no networking.
//!
//! ## Global Options
//!
//! - `--config` / `FACTORFLEET_CONFIG`: TOML file with ports, search tuning
//!   and network timing (defaults apply when absent).
//! - `--threads`: rayon pool size for `race` (default: all cores).
//! - `--advertise-host` / `FACTORFLEET_ADVERTISE_HOST`: address peers use to
//!   reach this process. Workers on another machine than the coordinator
//!   must set it to an address both the coordinator and dispatchers can reach.
//! - `LOG_FORMAT=json` switches log output to JSON lines; `RUST_LOG` filters.

mod cli;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "factorfleet", about = "Distributed integer factorization")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "FACTORFLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Number of rayon threads for `race` (defaults to all logical cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Address other tiers use to reach this process (overrides
    /// network.advertise_host; must be reachable from the coordinator and
    /// every dispatcher host)
    #[arg(long, env = "FACTORFLEET_ADVERTISE_HOST", global = true)]
    advertise_host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the number to factor comes from. Exactly one is required.
#[derive(Args, Clone, Debug)]
#[group(required = true, multiple = false)]
struct NumberArgs {
    /// Factor this decimal number
    #[arg(short = 'n', long)]
    number: Option<String>,

    /// Factor the product of two random primes of BITS bits each
    #[arg(short = 'g', long, value_name = "BITS")]
    generate: Option<u32>,

    /// Factor a random number below 2^BITS
    #[arg(short = 'r', long, value_name = "BITS")]
    random: Option<u32>,

    /// Factor P * Q
    #[arg(long, num_args = 2, value_names = ["P", "Q"])]
    pq: Option<Vec<String>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator for one number
    Coordinator {
        #[command(flatten)]
        source: NumberArgs,
        /// Seed for the random sources
        #[arg(long)]
        seed: Option<u64>,
        /// Start as soon as all four dispatchers have registered instead of
        /// waiting for `factor` on stdin or a `start` command
        #[arg(long)]
        autostart: bool,
        /// Write the text report here (and a JSON sidecar beside it)
        #[arg(long)]
        results: Option<PathBuf>,
    },
    /// Join a fleet as a worker
    Worker {
        /// Coordinator host
        #[arg(long, env = "FACTORFLEET_HOST", default_value = "127.0.0.1")]
        host: String,
    },
    /// Tell a waiting coordinator to start
    Start {
        /// Coordinator host
        #[arg(long, env = "FACTORFLEET_HOST", default_value = "127.0.0.1")]
        host: String,
    },
    /// Run a coordinator and workers in this process
    Local {
        #[command(flatten)]
        source: NumberArgs,
        #[arg(long)]
        seed: Option<u64>,
        /// Worker count (at least 4)
        #[arg(long, default_value_t = 4)]
        workers: usize,
        #[arg(long)]
        results: Option<PathBuf>,
    },
    /// Race all four algorithms on this machine and print the first split
    Race {
        #[command(flatten)]
        source: NumberArgs,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let mut config = factorfleet::config::FleetConfig::load(cli.config.as_deref())?;
    config.override_advertise_host(cli.advertise_host.as_deref())?;
    cli::configure_rayon(cli.threads);

    match &cli.command {
        Commands::Coordinator {
            source,
            seed,
            autostart,
            results,
        } => cli::run_coordinator(&config, source, *seed, *autostart, results.clone()),
        Commands::Worker { host } => cli::run_worker(&config, host),
        Commands::Start { host } => cli::run_start(&config, host),
        Commands::Local {
            source,
            seed,
            workers,
            results,
        } => cli::run_local(&config, source, *seed, *workers, results.clone()),
        Commands::Race { source, seed } => cli::run_race(&config, source, *seed),
    }
}
