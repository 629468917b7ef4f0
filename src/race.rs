//! # Race — All Four Algorithms On One Machine
//!
//! Runs one search loop per [`FactorKind`] on the rayon pool, each driving a
//! private [`Dispatcher`] with a single virtual worker, so the partitioning and
//! Pollard rebalancing are the same code the fleet uses. The first kind to
//! find a nontrivial factor wins; the others see the shared stop flag at their
//! next round boundary.

use anyhow::Result;
use rayon::prelude::*;
use rug::Integer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::dispatcher::Dispatcher;
use crate::error::FactorError;
use crate::kind::FactorKind;
use crate::record::{Endpoint, Message};
use crate::worker;

/// Largest trial chunk one round may take, so the stop flag is seen promptly.
const RACE_TRIAL_CHUNK: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceOutcome {
    pub factor: Integer,
    pub cofactor: Integer,
    pub winner: FactorKind,
    pub elapsed: Duration,
}

/// Split `n` once. `Ok(None)` means `n` is prime.
pub fn race(n: &Integer, search: &SearchConfig) -> Result<Option<RaceOutcome>> {
    if *n < 2 {
        return Err(FactorError::InvalidNumber { value: n.clone() }.into());
    }
    if crate::is_probable_prime(n, search.mr_rounds) {
        return Ok(None);
    }

    let start = Instant::now();
    let mut search = search.clone();
    search.trial_increment_cap = search.trial_increment_cap.min(RACE_TRIAL_CHUNK);
    let stop = AtomicBool::new(false);

    let found = FactorKind::ALL
        .par_iter()
        .find_map_any(|&kind| {
            let factor = run_kind(kind, n, &search, &stop)?;
            stop.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .ok()
                .map(|_| (kind, factor))
        });

    let Some((winner, factor)) = found else {
        anyhow::bail!("no algorithm split {}", n);
    };
    let cofactor = Integer::from(n / &factor);
    let elapsed = start.elapsed();
    info!(%n, %factor, %winner, elapsed_ms = elapsed.as_millis() as u64, "race won");
    Ok(Some(RaceOutcome {
        factor,
        cofactor,
        winner,
        elapsed,
    }))
}

/// Drive one kind until it finds a factor, runs out of space, or is stopped.
fn run_kind(kind: FactorKind, n: &Integer, search: &SearchConfig, stop: &AtomicBool) -> Option<Integer> {
    let me = Endpoint::new("race", kind.default_port());
    let mut dispatcher = Dispatcher::new(kind, me.clone(), me.clone(), None, search.clone());
    dispatcher.handle(Message::Start { number: n.clone() });
    let mut outbound = dispatcher.handle(Message::Register {
        kind,
        reply_to: me.clone(),
    });

    let mut rounds = 0u64;
    while !stop.load(Ordering::Acquire) {
        let record = outbound.into_iter().find_map(|o| match o.message {
            Message::Run(record) => Some(record),
            _ => None,
        });
        let Some(record) = record else {
            debug!(%kind, rounds, "search space exhausted");
            return None;
        };
        rounds += 1;
        match worker::search(record) {
            Message::FactorFound(record) => {
                debug!(%kind, rounds, "factor found");
                return record.factor().cloned();
            }
            report => outbound = dispatcher.handle(report),
        }
    }
    debug!(%kind, rounds, "stopped");
    None
}
