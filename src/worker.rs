//! # Worker — Executes One Algorithm Over Assigned Sub-Ranges
//!
//! A worker announces itself to the coordinator, receives an algorithm kind,
//! registers with that kind's dispatcher and then loops: `run` in, search,
//! `factor-found` or `failed` out. The first worker of each kind is asked to
//! host the dispatcher itself; it starts it on the kind's well-known port in
//! this process and waits for it to be listening before registering.
//!
//! ## Network precondition
//!
//! The worker's callback endpoint (`network.advertise_host` plus an ephemeral
//! port) must be reachable from the coordinator and from the dispatcher of its
//! kind. A hosting worker's dispatcher is advertised on the same host, so it
//! must also be reachable from every other worker of that kind. Set
//! `--advertise-host` on any machine that is not the coordinator's.
//!
//! ## Phases
//!
//! `Unassigned → Registered → Awaiting ⇄ Searching → Terminated`
//!
//! A hosting worker is never sent `terminate` by its own dispatcher; it
//! terminates when the dispatcher it hosts exits. If the dispatcher does not
//! come up (the well-known port is taken, or readiness polling runs out) the
//! worker sends `hosting-failed` and waits parked for the coordinator to relay
//! whichever dispatcher of its kind registers next.

use anyhow::Result;
use rug::Integer;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::algorithms::{fermat, pollard_p1_round, trial_down, trial_up, P1Outcome};
use crate::config::{is_loopback, FleetConfig, NetworkConfig};
use crate::dispatcher::{self, DispatcherHandle};
use crate::kind::FactorKind;
use crate::lock_or_recover;
use crate::progress::Progress;
use crate::record::{Endpoint, Message, SearchState, WorkRecord};
use crate::transport::{Outbound, Outbox, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Unassigned,
    /// Kind known, no dispatcher to register with yet.
    Registered,
    Awaiting,
    Searching,
    Terminated,
}

/// Side effects the driver performs for the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerAction {
    Send(Outbound),
    /// Start the dispatcher for this kind in-process.
    HostDispatcher(FactorKind),
    Search(WorkRecord),
}

pub struct Worker {
    endpoint: Endpoint,
    coordinator: Endpoint,
    phase: WorkerPhase,
    kind: Option<FactorKind>,
    dispatcher: Option<Endpoint>,
    /// Endpoint of the dispatcher this worker hosts, while it runs.
    hosted: Option<Endpoint>,
}

impl Worker {
    pub fn new(endpoint: Endpoint, coordinator: Endpoint) -> Self {
        Worker {
            endpoint,
            coordinator,
            phase: WorkerPhase::Unassigned,
            kind: None,
            dispatcher: None,
            hosted: None,
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    pub fn kind(&self) -> Option<FactorKind> {
        self.kind
    }

    pub fn startup(&self) -> Vec<WorkerAction> {
        vec![WorkerAction::Send(Outbound::new(
            self.coordinator.clone(),
            Message::NewClient {
                reply_to: self.endpoint.clone(),
            },
        ))]
    }

    pub fn handle(&mut self, message: Message) -> Vec<WorkerAction> {
        if self.phase == WorkerPhase::Terminated {
            return Vec::new();
        }
        match message {
            Message::Assign(assignment) => {
                if self.kind.is_some() {
                    // a parked worker may be promoted later for its own kind
                    let parked = self.dispatcher.is_none() && self.hosted.is_none();
                    if assignment.promote && self.kind == Some(assignment.kind) && parked {
                        info!(worker = %self.endpoint, kind = %assignment.kind, "promoted while parked");
                        return vec![WorkerAction::HostDispatcher(assignment.kind)];
                    }
                    debug!(worker = %self.endpoint, "already assigned");
                    return Vec::new();
                }
                info!(worker = %self.endpoint, kind = %assignment.kind, promote = assignment.promote, "assigned");
                self.kind = Some(assignment.kind);
                self.phase = WorkerPhase::Registered;
                if assignment.promote {
                    return vec![WorkerAction::HostDispatcher(assignment.kind)];
                }
                match assignment.dispatcher {
                    Some(dispatcher) => self.register_with(dispatcher),
                    None => Vec::new(),
                }
            }
            Message::RegisterSubserver { kind, endpoint } => {
                if self.kind != Some(kind) || self.dispatcher.is_some() {
                    debug!(worker = %self.endpoint, %kind, "ignoring dispatcher relay");
                    return Vec::new();
                }
                self.register_with(endpoint)
            }
            Message::Run(record) => {
                if Some(record.kind()) != self.kind {
                    warn!(worker = %self.endpoint, kind = %record.kind(), "run for a kind this worker does not execute");
                    return Vec::new();
                }
                self.phase = WorkerPhase::Searching;
                vec![WorkerAction::Search(record)]
            }
            Message::Terminate => {
                info!(worker = %self.endpoint, "terminate received");
                self.phase = WorkerPhase::Terminated;
                match self.hosted.take() {
                    Some(hosted) => vec![WorkerAction::Send(Outbound::new(hosted, Message::Terminate))],
                    None => Vec::new(),
                }
            }
            other => {
                debug!(worker = %self.endpoint, intent = other.intent(), "ignoring message");
                Vec::new()
            }
        }
    }

    /// The hosted dispatcher is listening at `endpoint`.
    pub fn dispatcher_ready(&mut self, endpoint: Endpoint) -> Vec<WorkerAction> {
        self.hosted = Some(endpoint.clone());
        self.register_with(endpoint)
    }

    /// The dispatcher this worker was asked to host never came up. The worker
    /// stays parked on its kind and tells the coordinator to promote another.
    pub fn hosting_failed(&mut self) -> Vec<WorkerAction> {
        let Some(kind) = self.kind else {
            return Vec::new();
        };
        if self.phase == WorkerPhase::Terminated {
            return Vec::new();
        }
        self.phase = WorkerPhase::Registered;
        vec![WorkerAction::Send(Outbound::new(
            self.coordinator.clone(),
            Message::HostingFailed {
                kind,
                reply_to: self.endpoint.clone(),
            },
        ))]
    }

    /// The hosted dispatcher exited, which only happens on terminate.
    pub fn hosted_dispatcher_exited(&mut self) {
        self.hosted = None;
        if self.phase != WorkerPhase::Terminated {
            info!(worker = %self.endpoint, "hosted dispatcher finished");
            self.phase = WorkerPhase::Terminated;
        }
    }

    /// Report the outcome of a search round to the dispatcher.
    pub fn search_finished(&mut self, report: Message) -> Vec<WorkerAction> {
        if self.phase == WorkerPhase::Terminated {
            return Vec::new();
        }
        self.phase = WorkerPhase::Awaiting;
        match &self.dispatcher {
            Some(dispatcher) => vec![WorkerAction::Send(Outbound::new(dispatcher.clone(), report))],
            None => {
                warn!(worker = %self.endpoint, intent = report.intent(), "no dispatcher to report to");
                Vec::new()
            }
        }
    }

    fn register_with(&mut self, dispatcher: Endpoint) -> Vec<WorkerAction> {
        let Some(kind) = self.kind else {
            return Vec::new();
        };
        info!(worker = %self.endpoint, %kind, %dispatcher, "registering with dispatcher");
        self.dispatcher = Some(dispatcher.clone());
        self.phase = WorkerPhase::Awaiting;
        vec![WorkerAction::Send(Outbound::new(
            dispatcher,
            Message::Register {
                kind,
                reply_to: self.endpoint.clone(),
            },
        ))]
    }
}

fn nontrivial(factor: &Integer, n: &Integer) -> bool {
    *factor > 1 && factor < n
}

/// Run one round of the record's algorithm over its assigned slice.
///
/// Returns `factor-found` with the factor recorded, or `failed` with the
/// resumable state advanced past the slice.
pub fn search(mut record: WorkRecord) -> Message {
    let n = record.number().clone();
    let found = match record.state().clone() {
        SearchState::Trial { lower, upper } => {
            if record.kind() == FactorKind::TrialUp {
                trial_up(&n, &lower, &upper)
            } else {
                trial_down(&n, &lower, &upper)
            }
        }
        SearchState::Fermat { start, attempts } => match fermat(&n, &start, attempts) {
            Ok(Some(f)) if nontrivial(&f, &n) => Some(f),
            Ok(_) => {
                if let Err(e) = record.set_fermat_start(start + attempts) {
                    warn!(error = %e, "fermat start not advanced");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "fermat round rejected");
                None
            }
        },
        SearchState::Pollard(p) => {
            if p.exhausted() {
                debug!(base = %p.base, "pollard bracket collapsed, moving to the next base");
                if let Err(e) = record.increment_pollard_base() {
                    warn!(error = %e, "pollard base not advanced");
                }
                return Message::Failed(record);
            }
            let bound = p.midpoint_bound();
            match pollard_p1_round(&n, &p.power, &p.cursor, &bound) {
                P1Outcome::Factor(f) => Some(f),
                P1Outcome::BoundTooSmall { power } => {
                    if let Ok(state) = record.pollard_mut() {
                        state.power = power;
                        state.cursor = Integer::from(&bound + 1u32);
                        state.lower = bound.clone();
                        state.last_bound = Some(bound);
                    }
                    None
                }
                P1Outcome::BoundTooLarge => {
                    if let Ok(state) = record.pollard_mut() {
                        state.upper = bound.clone();
                        state.restart_power();
                        state.last_bound = Some(bound);
                    }
                    None
                }
            }
        }
    };

    match found {
        Some(f) if nontrivial(&f, &n) => match record.add_factor(f) {
            Ok(()) => Message::FactorFound(record),
            Err(e) => {
                warn!(error = %e, "search produced a non-divisor");
                Message::Failed(record)
            }
        },
        _ => Message::Failed(record),
    }
}

/// Poll `handle.ready` with a fixed backoff.
async fn wait_ready(handle: &DispatcherHandle, network: &NetworkConfig) -> Result<()> {
    for _ in 0..network.ready_poll_attempts {
        if handle.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        if handle.is_finished() {
            anyhow::bail!("dispatcher for {} exited during startup", handle.kind);
        }
        tokio::time::sleep(network.ready_poll()).await;
    }
    if handle.ready.load(Ordering::Acquire) {
        return Ok(());
    }
    anyhow::bail!(
        "dispatcher for {} not ready after {} attempts",
        handle.kind,
        network.ready_poll_attempts
    )
}

async fn hosted_exit(hosted: &mut Option<DispatcherHandle>) {
    match hosted {
        Some(handle) => {
            match (&mut handle.join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "hosted dispatcher failed"),
                Err(e) => warn!(error = %e, "hosted dispatcher panicked"),
            }
        }
        None => std::future::pending().await,
    }
}

/// Join the fleet coordinated at `coordinator` and work until terminated.
pub async fn run<T: Transport>(transport: T, config: FleetConfig, coordinator: Endpoint) -> Result<()> {
    let (endpoint, mut inbox) = transport
        .listen(&config.network.bind_host, &config.network.advertise_host, 0)
        .await?;
    info!(%endpoint, %coordinator, "worker listening");
    if config.network.advertises_loopback() && !is_loopback(&coordinator.host) {
        warn!(
            %endpoint,
            %coordinator,
            "advertising a loopback address to a remote coordinator; set --advertise-host"
        );
    }

    let state = Arc::new(Mutex::new(Worker::new(endpoint.clone(), coordinator.clone())));
    let progress = Progress::new(format!("worker/{}", endpoint));
    let reporter = progress.start_reporter(Duration::from_secs(config.network.progress_interval_secs));
    let mut outbox = Outbox::new(transport.clone(), config.network.retry_policy());
    let mut hosted: Option<DispatcherHandle> = None;
    let mut pending: VecDeque<WorkerAction> = lock_or_recover(&state).startup().into();

    loop {
        while let Some(action) = pending.pop_front() {
            match action {
                WorkerAction::Send(outbound) => outbox.push(outbound),
                WorkerAction::HostDispatcher(kind) => {
                    let handle = dispatcher::spawn(
                        transport.clone(),
                        &config,
                        kind,
                        coordinator.clone(),
                        Some(endpoint.clone()),
                    );
                    let started = wait_ready(&handle, &config.network).await;
                    match started {
                        Ok(()) => {
                            let dispatcher_endpoint = handle.endpoint.clone();
                            hosted = Some(handle);
                            pending.extend(lock_or_recover(&state).dispatcher_ready(dispatcher_endpoint));
                        }
                        Err(e) => {
                            warn!(error = %e, %kind, "could not host dispatcher");
                            handle.join.abort();
                            pending.extend(lock_or_recover(&state).hosting_failed());
                        }
                    }
                }
                WorkerAction::Search(record) => {
                    progress.set_current(format!("{} {}", record.kind(), record.number()));
                    let report = tokio::task::spawn_blocking(move || search(record)).await?;
                    progress.rounds.fetch_add(1, Ordering::Relaxed);
                    match &report {
                        Message::FactorFound(r) => {
                            progress.factors.fetch_add(1, Ordering::Relaxed);
                            info!(kind = %r.kind(), factor = ?r.factor().map(|f| f.to_string()), "factor found");
                        }
                        _ => {
                            progress.failures.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    pending.extend(lock_or_recover(&state).search_finished(report));
                }
            }
        }
        if lock_or_recover(&state).phase() == WorkerPhase::Terminated {
            break;
        }

        tokio::select! {
            message = inbox.recv() => match message {
                Some(message) => pending.extend(lock_or_recover(&state).handle(message)),
                None => break,
            },
            _ = hosted_exit(&mut hosted) => {
                hosted = None;
                lock_or_recover(&state).hosted_dispatcher_exited();
            }
        }
    }

    drop(inbox);
    if let Some(handle) = hosted.take() {
        if tokio::time::timeout(config.network.drain_grace(), handle.join).await.is_err() {
            warn!("hosted dispatcher did not finish in time");
        }
    }
    outbox.close(config.network.drain_grace()).await;
    progress.stop();
    if let Some(reporter) = reporter {
        let _ = tokio::task::spawn_blocking(move || reporter.join()).await;
    }
    info!(%endpoint, "worker finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Assignment;

    fn scenario() -> Integer {
        Integer::from(6563u32 * 9311)
    }

    fn worker() -> Worker {
        Worker::new(Endpoint::new("w", 40001), Endpoint::new("c", 10188))
    }

    fn assign(kind: FactorKind, promote: bool, dispatcher: Option<Endpoint>) -> Message {
        Message::Assign(Assignment {
            kind,
            promote,
            number: scenario(),
            dispatcher,
        })
    }

    #[test]
    fn startup_announces_to_coordinator() {
        let w = worker();
        assert_eq!(
            w.startup(),
            vec![WorkerAction::Send(Outbound::new(
                Endpoint::new("c", 10188),
                Message::NewClient {
                    reply_to: Endpoint::new("w", 40001)
                }
            ))]
        );
        assert_eq!(w.phase(), WorkerPhase::Unassigned);
    }

    #[test]
    fn promoted_worker_hosts_then_registers() {
        let mut w = worker();
        assert_eq!(
            w.handle(assign(FactorKind::Fermat, true, None)),
            vec![WorkerAction::HostDispatcher(FactorKind::Fermat)]
        );
        let d = Endpoint::new("w", 12458);
        let out = w.dispatcher_ready(d.clone());
        assert!(matches!(
            &out[..],
            [WorkerAction::Send(Outbound { to, message: Message::Register { kind: FactorKind::Fermat, .. } })] if *to == d
        ));
        assert_eq!(w.phase(), WorkerPhase::Awaiting);
    }

    #[test]
    fn failed_hosting_reports_and_waits_for_relay() {
        let mut w = worker();
        w.handle(assign(FactorKind::TrialDown, true, None));
        assert_eq!(
            w.hosting_failed(),
            vec![WorkerAction::Send(Outbound::new(
                Endpoint::new("c", 10188),
                Message::HostingFailed {
                    kind: FactorKind::TrialDown,
                    reply_to: Endpoint::new("w", 40001),
                }
            ))]
        );
        assert_eq!(w.phase(), WorkerPhase::Registered);
        assert_eq!(w.kind(), Some(FactorKind::TrialDown));

        let out = w.handle(Message::RegisterSubserver {
            kind: FactorKind::TrialDown,
            endpoint: Endpoint::new("d", 10897),
        });
        assert_eq!(out.len(), 1);
        assert_eq!(w.phase(), WorkerPhase::Awaiting);
    }

    #[test]
    fn parked_worker_accepts_promotion_for_its_kind_only() {
        let mut w = worker();
        w.handle(assign(FactorKind::Fermat, false, None));
        assert!(w.handle(assign(FactorKind::TrialUp, true, None)).is_empty());
        assert!(w.handle(assign(FactorKind::Fermat, false, None)).is_empty());
        assert_eq!(
            w.handle(assign(FactorKind::Fermat, true, None)),
            vec![WorkerAction::HostDispatcher(FactorKind::Fermat)]
        );

        // once registered with a dispatcher, a promotion is stale
        let mut w = worker();
        w.handle(assign(FactorKind::Fermat, false, Some(Endpoint::new("d", 12458))));
        assert!(w.handle(assign(FactorKind::Fermat, true, None)).is_empty());
    }

    #[test]
    fn parked_worker_registers_on_relay() {
        let mut w = worker();
        assert!(w.handle(assign(FactorKind::TrialDown, false, None)).is_empty());
        assert_eq!(w.phase(), WorkerPhase::Registered);
        assert!(w
            .handle(Message::RegisterSubserver {
                kind: FactorKind::Fermat,
                endpoint: Endpoint::new("x", 1)
            })
            .is_empty());
        let out = w.handle(Message::RegisterSubserver {
            kind: FactorKind::TrialDown,
            endpoint: Endpoint::new("d", 10897),
        });
        assert_eq!(out.len(), 1);
        assert_eq!(w.phase(), WorkerPhase::Awaiting);
    }

    #[test]
    fn run_for_other_kind_ignored() {
        let mut w = worker();
        w.handle(assign(FactorKind::TrialUp, false, Some(Endpoint::new("d", 12486))));
        let record = WorkRecord::new(scenario(), FactorKind::Fermat, 1000).unwrap();
        assert!(w.handle(Message::Run(record)).is_empty());
        let record = WorkRecord::new(scenario(), FactorKind::TrialUp, 1000).unwrap();
        assert!(matches!(&w.handle(Message::Run(record))[..], [WorkerAction::Search(_)]));
        assert_eq!(w.phase(), WorkerPhase::Searching);
    }

    #[test]
    fn search_result_goes_to_dispatcher() {
        let mut w = worker();
        let d = Endpoint::new("d", 12486);
        w.handle(assign(FactorKind::TrialUp, false, Some(d.clone())));
        let record = WorkRecord::new(scenario(), FactorKind::TrialUp, 1000).unwrap();
        w.handle(Message::Run(record.clone()));
        let out = w.search_finished(Message::Failed(record.clone()));
        assert_eq!(out, vec![WorkerAction::Send(Outbound::new(d, Message::Failed(record)))]);
        assert_eq!(w.phase(), WorkerPhase::Awaiting);
    }

    #[test]
    fn terminate_forwards_to_hosted_dispatcher_once() {
        let mut w = worker();
        w.handle(assign(FactorKind::PollardP1, true, None));
        let d = Endpoint::new("w", 11489);
        w.dispatcher_ready(d.clone());
        let out = w.handle(Message::Terminate);
        assert_eq!(out, vec![WorkerAction::Send(Outbound::new(d, Message::Terminate))]);
        assert_eq!(w.phase(), WorkerPhase::Terminated);
        assert!(w.handle(Message::Terminate).is_empty());
        assert!(w.search_finished(Message::Terminate).is_empty());
    }

    #[test]
    fn hosted_exit_terminates_worker() {
        let mut w = worker();
        w.handle(assign(FactorKind::TrialUp, true, None));
        w.dispatcher_ready(Endpoint::new("w", 12486));
        w.hosted_dispatcher_exited();
        assert_eq!(w.phase(), WorkerPhase::Terminated);
    }

    #[test]
    fn trial_search_reports_factor_or_failure() {
        let mut record = WorkRecord::new(scenario(), FactorKind::TrialUp, 1000).unwrap();
        match search(record.clone()) {
            Message::FactorFound(r) => assert_eq!(r.factor(), Some(&Integer::from(6563u32))),
            other => panic!("unexpected {:?}", other),
        }
        record.set_trial_bounds(Integer::from(2u32), Integer::from(6000u32)).unwrap();
        assert!(matches!(search(record), Message::Failed(_)));

        let down = WorkRecord::new(scenario(), FactorKind::TrialDown, 1000).unwrap();
        assert!(matches!(search(down), Message::FactorFound(_)));
    }

    #[test]
    fn fermat_failure_advances_start() {
        let record = WorkRecord::new(scenario(), FactorKind::Fermat, 100).unwrap();
        let Message::Failed(r) = search(record) else { panic!() };
        assert_eq!(r.fermat_start().unwrap().0, &Integer::from(7918u32));
        let Message::FactorFound(r) = search(r) else { panic!() };
        assert_eq!(r.factor(), Some(&Integer::from(6563u32)));
    }

    #[test]
    fn fermat_trivial_factor_is_a_failure() {
        // 7 * 11: at a = 39, b = 38 gives the trivial split 1 * 77
        let mut record = WorkRecord::new(Integer::from(77u32), FactorKind::Fermat, 1).unwrap();
        record.set_fermat_start(Integer::from(39u32)).unwrap();
        assert!(matches!(search(record), Message::Failed(_)));
    }

    #[test]
    fn pollard_search_walks_bracket() {
        let mut record = WorkRecord::new(scenario(), FactorKind::PollardP1, 1000).unwrap();
        record.set_pollard_upper(Integer::from(36u32)).unwrap();
        // bound (1 + 36) / 2 = 18: too small
        let Message::Failed(r) = search(record) else { panic!() };
        let p = r.pollard().unwrap();
        assert_eq!(p.lower, 18u32);
        assert_eq!(p.cursor, 19u32);
        assert_eq!(p.last_bound, Some(Integer::from(18u32)));
        // bound (18 + 36) / 2 = 27: finds 9311
        let Message::FactorFound(r) = search(r) else { panic!() };
        assert_eq!(r.factor(), Some(&Integer::from(9311u32)));
    }

    #[test]
    fn pollard_too_large_restarts_power() {
        let record = WorkRecord::new(scenario(), FactorKind::PollardP1, 1000).unwrap();
        // bound (1 + 7817) / 2 = 3909: both factors smooth
        let Message::Failed(r) = search(record) else { panic!() };
        let p = r.pollard().unwrap();
        assert_eq!(p.upper, 3909u32);
        assert_eq!(p.power, 2u32);
        assert_eq!(p.cursor, 1u32);
        assert_eq!(p.last_bound, Some(Integer::from(3909u32)));
    }

    #[test]
    fn pollard_exhausted_bracket_moves_base() {
        let mut record = WorkRecord::new(scenario(), FactorKind::PollardP1, 1000).unwrap();
        {
            let p = record.pollard_mut().unwrap();
            p.lower = Integer::from(100u32);
            p.upper = Integer::from(101u32);
        }
        let Message::Failed(r) = search(record) else { panic!() };
        let p = r.pollard().unwrap();
        assert_eq!(p.base, 3u32);
        assert_eq!(p.lower, 1u32);
        assert_eq!(p.upper, 7817u32);
        assert_eq!(p.last_bound, None);
    }

    #[test]
    fn pollard_tries_last_bound_before_moving_base() {
        let mut record = WorkRecord::new(scenario(), FactorKind::PollardP1, 1000).unwrap();
        {
            let p = record.pollard_mut().unwrap();
            p.lower = Integer::from(17u32);
            p.upper = Integer::from(19u32);
        }
        // 18 is still untried: neither 6562 nor 9310 is 18-smooth
        let Message::Failed(r) = search(record) else { panic!() };
        let p = r.pollard().unwrap();
        assert_eq!(p.base, 2u32);
        assert_eq!(p.lower, 18u32);
        assert_eq!(p.last_bound, Some(Integer::from(18u32)));

        let Message::Failed(r) = search(r) else { panic!() };
        assert_eq!(r.pollard().unwrap().base, 3u32);
    }
}
