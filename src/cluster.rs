//! Whole fleet inside one process: a coordinator plus `workers` worker tasks
//! sharing one transport. The first four workers end up hosting the four
//! dispatchers, exactly as they would across machines.

use anyhow::Result;
use rug::Integer;
use std::path::PathBuf;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::FleetConfig;
use crate::coordinator::{self, CoordinatorOptions, CoordinatorPhase};
use crate::kind::FactorKind;
use crate::lock_or_recover;
use crate::results::FactorReport;
use crate::transport::Transport;
use crate::worker;

/// Factor `number` with an in-process fleet and return the final report.
pub async fn run_local<T: Transport>(
    transport: T,
    config: &FleetConfig,
    number: Integer,
    workers: usize,
    results: Option<PathBuf>,
) -> Result<FactorReport> {
    if workers < FactorKind::ALL.len() {
        anyhow::bail!(
            "a local fleet needs at least {} workers (one per algorithm), got {}",
            FactorKind::ALL.len(),
            workers
        );
    }

    let options = CoordinatorOptions {
        autostart: true,
        results,
    };
    let handle = coordinator::spawn(transport.clone(), config, number, options).await?;
    if lock_or_recover(&handle.state).phase() == CoordinatorPhase::Done {
        return handle.join.await?;
    }
    info!(coordinator = %handle.endpoint, workers, "starting local fleet");

    let mut fleet = JoinSet::new();
    for _ in 0..workers {
        fleet.spawn(worker::run(transport.clone(), config.clone(), handle.endpoint.clone()));
    }

    let report = handle.join.await??;

    let drained = tokio::time::timeout(config.network.drain_grace(), async {
        while let Some(joined) = fleet.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "worker failed"),
                Err(e) => warn!(error = %e, "worker task panicked"),
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(remaining = fleet.len(), "workers still running after the drain grace, aborting");
        fleet.abort_all();
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    #[tokio::test]
    async fn too_few_workers_rejected() {
        let err = run_local(ChannelTransport::new(), &FleetConfig::default(), Integer::from(35u32), 3, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least 4"));
    }

    #[tokio::test]
    async fn prime_needs_no_fleet() {
        let transport = ChannelTransport::new();
        let report = run_local(transport.clone(), &FleetConfig::default(), Integer::from(9311u32), 4, None)
            .await
            .unwrap();
        assert_eq!(report.factors, vec![Integer::from(9311u32)]);
        assert_eq!(transport.live_endpoints(), 0);
    }
}
