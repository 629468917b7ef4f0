//! # CLI Execution Functions
//!
//! Kept out of `main.rs` so the entry point stays a routing table. Each
//! `run_*` owns its tokio runtime; only `race` runs without one.

use anyhow::Result;
use factorfleet::config::FleetConfig;
use factorfleet::coordinator::{self, CoordinatorOptions};
use factorfleet::record::{Endpoint, Message};
use factorfleet::source::{NumberSource, Target};
use factorfleet::transport::{TcpTransport, Transport};
use factorfleet::{cluster, race, results::FactorReport, worker};
use rug::Integer;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

use super::NumberArgs;

impl NumberArgs {
    fn source(&self) -> Result<NumberSource> {
        if let Some(number) = &self.number {
            return Ok(NumberSource::Literal(number.clone()));
        }
        if let Some(bits) = self.generate {
            return Ok(NumberSource::RandomSemiprime { bits });
        }
        if let Some(bits) = self.random {
            return Ok(NumberSource::Random { bits });
        }
        match self.pq.as_deref() {
            Some([p, q]) => Ok(NumberSource::Product(p.clone(), q.clone())),
            _ => anyhow::bail!("one of --number, --generate, --random or --pq is required"),
        }
    }

    fn resolve(&self, seed: Option<u64>) -> Result<Target> {
        let target = self.source()?.resolve(seed)?;
        match &target.known_factors {
            Some((p, q)) => info!(n = %target.number, %p, %q, bits = target.number.significant_bits(), "target built from known factors"),
            None => info!(n = %target.number, bits = target.number.significant_bits(), "target"),
        }
        Ok(target)
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

fn print_report(report: &FactorReport) {
    print!("{}", report.render_text());
}

/// Read operator commands from stdin; `factor` or `start` sends `start` to `to`.
async fn operator_trigger(transport: TcpTransport, to: Endpoint) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    info!("type 'factor' to start");
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "factor" | "start" => {
                    if let Err(e) = transport.send(&to, &Message::Start { number: Integer::new() }).await {
                        warn!(error = %e, "could not trigger start");
                    }
                    return;
                }
                "" => {}
                other => info!(command = other, "unknown command, type 'factor' to start"),
            },
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                return;
            }
        }
    }
}

pub fn run_coordinator(
    config: &FleetConfig,
    source: &NumberArgs,
    seed: Option<u64>,
    autostart: bool,
    results: Option<PathBuf>,
) -> Result<()> {
    let target = source.resolve(seed)?;
    let rt = runtime()?;
    let report = rt.block_on(async {
        let transport = TcpTransport::new();
        let options = CoordinatorOptions { autostart, results };
        let handle = coordinator::spawn(transport.clone(), config, target.number, options).await?;
        let trigger = if autostart {
            None
        } else {
            Some(tokio::spawn(operator_trigger(transport, handle.endpoint.clone())))
        };
        let report = handle.join.await??;
        if let Some(trigger) = trigger {
            trigger.abort();
        }
        anyhow::Ok(report)
    })?;
    print_report(&report);
    // the stdin reader may still be blocked in a read
    rt.shutdown_background();
    Ok(())
}

pub fn run_worker(config: &FleetConfig, host: &str) -> Result<()> {
    let coordinator = Endpoint::new(host, config.ports.coordinator);
    info!(%coordinator, "joining fleet");
    runtime()?.block_on(worker::run(TcpTransport::new(), config.clone(), coordinator))
}

pub fn run_start(config: &FleetConfig, host: &str) -> Result<()> {
    let coordinator = Endpoint::new(host, config.ports.coordinator);
    runtime()?.block_on(async {
        TcpTransport::new()
            .send(&coordinator, &Message::Start { number: Integer::new() })
            .await
    })?;
    info!(%coordinator, "start sent");
    Ok(())
}

pub fn run_local(
    config: &FleetConfig,
    source: &NumberArgs,
    seed: Option<u64>,
    workers: usize,
    results: Option<PathBuf>,
) -> Result<()> {
    let target = source.resolve(seed)?;
    let report = runtime()?.block_on(cluster::run_local(
        TcpTransport::new(),
        config,
        target.number,
        workers,
        results,
    ))?;
    print_report(&report);
    Ok(())
}

pub fn run_race(config: &FleetConfig, source: &NumberArgs, seed: Option<u64>) -> Result<()> {
    let target = source.resolve(seed)?;
    match race::race(&target.number, &config.search)? {
        Some(outcome) => println!(
            "{} = {} * {} ({} in {} ms)",
            target.number,
            outcome.factor,
            outcome.cofactor,
            outcome.winner,
            outcome.elapsed.as_millis()
        ),
        None => println!("{} is prime", target.number),
    }
    Ok(())
}

/// Size the global rayon pool; `None` keeps rayon's default of one thread per core.
pub fn configure_rayon(threads: Option<usize>) {
    let Some(num_threads) = threads.filter(|&n| n > 0) else {
        return;
    };
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        warn!(error = %e, "Could not configure rayon thread pool");
    }
}
