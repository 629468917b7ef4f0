//! # Coordinator — Composite State and Fleet Assignment
//!
//! The coordinator owns the number being factored. It hands every worker
//! that announces itself an algorithm kind, relays dispatcher endpoints to
//! workers that asked before their dispatcher existed, and folds every
//! `factor-found` report into [`CompositeState`].
//!
//! A client is told to host a dispatcher whenever some kind has neither a
//! registered dispatcher nor an outstanding promotion, so the first four
//! clients host one kind each. A promoted worker that reports
//! `hosting-failed` is parked and the kind is offered to the next candidate.
//!
//! ## Composite state
//!
//! `original == product(extracted) * current * product(pending)` holds after
//! every report. A composite factor is queued in `pending` rather than
//! recorded as extracted; when `current` turns out prime it moves to
//! `extracted` and the next pending composite becomes the new target.
//!
//! ## Lifecycle
//!
//! `WaitingForConnections → Dispatching → Done`. Aggregation of a report
//! happens inside one `handle` call under the coordinator's lock, and its
//! outcome (a `new-value` broadcast or `terminate`) is sent after the lock is
//! released.

use anyhow::Result;
use rug::Integer;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FleetConfig;
use crate::is_probable_prime;
use crate::kind::FactorKind;
use crate::lock_or_recover;
use crate::progress::Progress;
use crate::record::{Assignment, Endpoint, Message};
use crate::results::{self, FactorReport};
use crate::transport::{Outbound, Outbox, Transport};

/// Result of folding one reported factor into the composite state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// `f <= 1` or `f >= current`.
    Trivial,
    /// `f` does not divide the current target.
    Stale,
    /// Keep searching on `next`.
    Continue { next: Integer },
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeState {
    original: Integer,
    current: Integer,
    extracted: Vec<Integer>,
    pending: VecDeque<Integer>,
    mr_rounds: u32,
}

impl CompositeState {
    pub fn new(original: Integer, mr_rounds: u32) -> Self {
        let mut state = CompositeState {
            current: original.clone(),
            original,
            extracted: Vec::new(),
            pending: VecDeque::new(),
            mr_rounds,
        };
        if is_probable_prime(&state.current, mr_rounds) {
            state.extracted.push(std::mem::replace(&mut state.current, Integer::from(1u32)));
        }
        state
    }

    pub fn original(&self) -> &Integer {
        &self.original
    }

    /// Residual composite currently under search (1 once complete).
    pub fn current(&self) -> &Integer {
        &self.current
    }

    pub fn extracted(&self) -> &[Integer] {
        &self.extracted
    }

    pub fn pending(&self) -> impl Iterator<Item = &Integer> {
        self.pending.iter()
    }

    pub fn is_complete(&self) -> bool {
        self.current == 1 && self.pending.is_empty()
    }

    /// `product(extracted) * current * product(pending)`.
    pub fn product(&self) -> Integer {
        let mut product = self.current.clone();
        for f in self.extracted.iter().chain(self.pending.iter()) {
            product *= f;
        }
        product
    }

    pub fn apply(&mut self, factor: &Integer) -> ReportOutcome {
        if self.is_complete() || *factor <= 1 || *factor >= self.current {
            return ReportOutcome::Trivial;
        }
        if !self.current.is_divisible(factor) {
            return ReportOutcome::Stale;
        }
        self.current.div_exact_mut(factor);
        if is_probable_prime(factor, self.mr_rounds) {
            self.extracted.push(factor.clone());
        } else {
            self.pending.push_back(factor.clone());
        }

        if !is_probable_prime(&self.current, self.mr_rounds) {
            return ReportOutcome::Continue {
                next: self.current.clone(),
            };
        }
        let prime = std::mem::replace(&mut self.current, Integer::from(1u32));
        self.extracted.push(prime);
        match self.pending.pop_front() {
            Some(next) => {
                self.current = next;
                ReportOutcome::Continue {
                    next: self.current.clone(),
                }
            }
            None => {
                self.extracted.sort();
                ReportOutcome::Complete
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    WaitingForConnections,
    Dispatching,
    Done,
}

pub struct Coordinator {
    composite: CompositeState,
    autostart: bool,
    phase: CoordinatorPhase,
    dispatchers: [Option<Endpoint>; 4],
    /// Worker asked to host each kind's dispatcher, until it registers or fails.
    promoting: [Option<Endpoint>; 4],
    clients: Vec<Endpoint>,
    /// Workers assigned a kind whose dispatcher has not registered yet.
    parked: Vec<(FactorKind, Endpoint)>,
    started_at: Option<Instant>,
    elapsed: Duration,
    winner: Option<FactorKind>,
}

impl Coordinator {
    /// A prime `number` is already `Done`.
    pub fn new(number: Integer, mr_rounds: u32, autostart: bool) -> Self {
        let composite = CompositeState::new(number, mr_rounds);
        let phase = if composite.is_complete() {
            CoordinatorPhase::Done
        } else {
            CoordinatorPhase::WaitingForConnections
        };
        Coordinator {
            composite,
            autostart,
            phase,
            dispatchers: Default::default(),
            promoting: Default::default(),
            clients: Vec::new(),
            parked: Vec::new(),
            started_at: None,
            elapsed: Duration::ZERO,
            winner: None,
        }
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    pub fn composite(&self) -> &CompositeState {
        &self.composite
    }

    pub fn dispatcher(&self, kind: FactorKind) -> Option<&Endpoint> {
        self.dispatchers[kind.index()].as_ref()
    }

    pub fn parked(&self) -> &[(FactorKind, Endpoint)] {
        &self.parked
    }

    /// Worker currently asked to host `kind`'s dispatcher.
    pub fn promoting(&self, kind: FactorKind) -> Option<&Endpoint> {
        self.promoting[kind.index()].as_ref()
    }

    /// The final report, once `Done`.
    pub fn report(&self) -> Option<FactorReport> {
        if self.phase != CoordinatorPhase::Done {
            return None;
        }
        Some(FactorReport::new(
            self.composite.original().clone(),
            self.composite.extracted().to_vec(),
            self.elapsed,
            self.winner,
        ))
    }

    pub fn handle(&mut self, message: Message) -> Vec<Outbound> {
        match message {
            Message::NewClient { reply_to } => self.on_new_client(reply_to),
            Message::RegisterSubserver { kind, endpoint } => self.on_register_subserver(kind, endpoint),
            Message::HostingFailed { kind, reply_to } => self.on_hosting_failed(kind, reply_to),
            // operator trigger; the number field is not consulted
            Message::Start { .. } => match self.phase {
                CoordinatorPhase::WaitingForConnections => self.start(),
                phase => {
                    debug!(?phase, "start ignored");
                    Vec::new()
                }
            },
            Message::FactorFound(record) => {
                if self.phase != CoordinatorPhase::Dispatching {
                    debug!(phase = ?self.phase, "factor report outside dispatching ignored");
                    return Vec::new();
                }
                let Some(factor) = record.factor().cloned() else {
                    warn!(kind = %record.kind(), "factor-found without a factor");
                    return Vec::new();
                };
                self.on_factor(record.kind(), factor)
            }
            other => {
                debug!(intent = other.intent(), "ignoring message");
                Vec::new()
            }
        }
    }

    fn on_new_client(&mut self, worker: Endpoint) -> Vec<Outbound> {
        if self.phase == CoordinatorPhase::Done {
            return vec![Outbound::new(worker, Message::Terminate)];
        }
        if self.clients.contains(&worker) {
            debug!(%worker, "duplicate new-client");
            return Vec::new();
        }
        let position = self.clients.len();
        self.clients.push(worker.clone());
        if let Some(kind) = self.unclaimed_kind() {
            info!(%worker, %kind, position, "promoting worker to host dispatcher");
            return vec![self.promote(kind, worker)];
        }
        let kind = FactorKind::from_index(position);
        let dispatcher = self.dispatchers[kind.index()].clone();
        if dispatcher.is_none() {
            self.parked.push((kind, worker.clone()));
        }
        info!(%worker, %kind, position, parked = dispatcher.is_none(), "assigning worker");
        vec![Outbound::new(
            worker,
            Message::Assign(Assignment {
                kind,
                promote: false,
                number: self.composite.current().clone(),
                dispatcher,
            }),
        )]
    }

    /// First kind with neither a registered dispatcher nor a live promotion.
    fn unclaimed_kind(&self) -> Option<FactorKind> {
        FactorKind::ALL
            .into_iter()
            .find(|k| self.dispatchers[k.index()].is_none() && self.promoting[k.index()].is_none())
    }

    fn promote(&mut self, kind: FactorKind, worker: Endpoint) -> Outbound {
        self.promoting[kind.index()] = Some(worker.clone());
        Outbound::new(
            worker,
            Message::Assign(Assignment {
                kind,
                promote: true,
                number: self.composite.current().clone(),
                dispatcher: None,
            }),
        )
    }

    /// The promoted worker keeps `kind` and waits parked; another parked
    /// worker of that kind, or else the next client, is promoted instead.
    fn on_hosting_failed(&mut self, kind: FactorKind, worker: Endpoint) -> Vec<Outbound> {
        if self.promoting[kind.index()].as_ref() != Some(&worker) {
            debug!(%kind, %worker, "hosting failure from a worker not promoting this kind");
            return Vec::new();
        }
        self.promoting[kind.index()] = None;
        if self.phase == CoordinatorPhase::Done {
            return vec![Outbound::new(worker, Message::Terminate)];
        }
        warn!(%kind, %worker, "promoted worker failed to host dispatcher");
        let successor = self.parked.iter().position(|(k, _)| *k == kind);
        self.parked.push((kind, worker));
        match successor {
            Some(index) => {
                let (_, next) = self.parked.remove(index);
                info!(%kind, worker = %next, "re-promoting parked worker");
                vec![self.promote(kind, next)]
            }
            None => Vec::new(),
        }
    }

    fn on_register_subserver(&mut self, kind: FactorKind, endpoint: Endpoint) -> Vec<Outbound> {
        info!(%kind, %endpoint, "dispatcher registered");
        self.dispatchers[kind.index()] = Some(endpoint.clone());
        self.promoting[kind.index()] = None;

        let mut out = Vec::new();
        let (relay, keep): (Vec<_>, Vec<_>) = self.parked.drain(..).partition(|(k, _)| *k == kind);
        self.parked = keep;
        for (_, worker) in relay {
            out.push(Outbound::new(
                worker,
                Message::RegisterSubserver {
                    kind,
                    endpoint: endpoint.clone(),
                },
            ));
        }

        match self.phase {
            CoordinatorPhase::WaitingForConnections => {
                if self.autostart && self.dispatchers.iter().all(Option::is_some) {
                    out.extend(self.start());
                }
            }
            CoordinatorPhase::Dispatching => out.push(Outbound::new(
                endpoint,
                Message::Start {
                    number: self.composite.current().clone(),
                },
            )),
            CoordinatorPhase::Done => out.push(Outbound::new(endpoint, Message::Terminate)),
        }
        out
    }

    fn start(&mut self) -> Vec<Outbound> {
        info!(number = %self.composite.current(), "starting factorization");
        self.phase = CoordinatorPhase::Dispatching;
        self.started_at = Some(Instant::now());
        let number = self.composite.current().clone();
        self.broadcast(|| Message::Start { number: number.clone() })
    }

    fn on_factor(&mut self, kind: FactorKind, factor: Integer) -> Vec<Outbound> {
        match self.composite.apply(&factor) {
            ReportOutcome::Trivial => {
                debug!(%kind, %factor, "trivial factor ignored");
                Vec::new()
            }
            ReportOutcome::Stale => {
                debug!(%kind, %factor, "stale factor dropped");
                Vec::new()
            }
            ReportOutcome::Continue { next } => {
                info!(%kind, %factor, next = %next, "factor accepted");
                self.broadcast(|| Message::NewValue { number: next.clone() })
            }
            ReportOutcome::Complete => {
                info!(%kind, %factor, "factorization complete");
                self.finish(kind)
            }
        }
    }

    fn finish(&mut self, winner: FactorKind) -> Vec<Outbound> {
        self.phase = CoordinatorPhase::Done;
        self.winner = Some(winner);
        self.elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        let mut out = self.broadcast(|| Message::Terminate);
        out.extend(
            self.parked
                .drain(..)
                .map(|(_, worker)| Outbound::new(worker, Message::Terminate)),
        );
        out
    }

    fn broadcast(&self, message: impl Fn() -> Message) -> Vec<Outbound> {
        self.dispatchers
            .iter()
            .flatten()
            .map(|endpoint| Outbound::new(endpoint.clone(), message()))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorOptions {
    /// Broadcast `start` once all four dispatchers have registered.
    pub autostart: bool,
    /// Where to write the text report (and its JSON sidecar).
    pub results: Option<PathBuf>,
}

pub struct CoordinatorHandle {
    pub endpoint: Endpoint,
    pub state: Arc<Mutex<Coordinator>>,
    pub join: JoinHandle<Result<FactorReport>>,
}

/// Bind the coordinator port and serve until the number is fully factored.
pub async fn spawn<T: Transport>(
    transport: T,
    config: &FleetConfig,
    number: Integer,
    options: CoordinatorOptions,
) -> Result<CoordinatorHandle> {
    let coordinator = Coordinator::new(number, config.search.mr_rounds, options.autostart);
    if coordinator.phase() == CoordinatorPhase::Done {
        info!(number = %coordinator.composite().original(), "number is prime, nothing to distribute");
        let endpoint = Endpoint::new(config.network.advertise_host.clone(), config.ports.coordinator);
        let state = Arc::new(Mutex::new(coordinator));
        let report_state = Arc::clone(&state);
        let join = tokio::spawn(async move {
            let report = lock_or_recover(&report_state).report();
            let report = report.ok_or_else(|| anyhow::anyhow!("coordinator finished without a report"))?;
            publish(&report, options.results.as_deref())?;
            Ok(report)
        });
        return Ok(CoordinatorHandle { endpoint, state, join });
    }

    let (endpoint, inbox) = transport
        .listen(&config.network.bind_host, &config.network.advertise_host, config.ports.coordinator)
        .await?;
    info!(%endpoint, number = %coordinator.composite().original(), "coordinator listening");
    let state = Arc::new(Mutex::new(coordinator));
    let join = tokio::spawn(serve(transport, config.clone(), inbox, Arc::clone(&state), options));
    Ok(CoordinatorHandle { endpoint, state, join })
}

async fn serve<T: Transport>(
    transport: T,
    config: FleetConfig,
    mut inbox: crate::transport::Inbox,
    state: Arc<Mutex<Coordinator>>,
    options: CoordinatorOptions,
) -> Result<FactorReport> {
    let progress = Progress::new("coordinator");
    progress.set_current(lock_or_recover(&state).composite().current().to_string());
    let reporter = progress.start_reporter(Duration::from_secs(config.network.progress_interval_secs));
    let mut outbox = Outbox::new(transport, config.network.retry_policy());

    while let Some(message) = inbox.recv().await {
        let (batch, done, current, accepted) = {
            let mut coordinator = lock_or_recover(&state);
            let before = coordinator.composite().extracted().len() + coordinator.composite().pending().count();
            let batch = coordinator.handle(message);
            let after = coordinator.composite().extracted().len() + coordinator.composite().pending().count();
            (
                batch,
                coordinator.phase() == CoordinatorPhase::Done,
                coordinator.composite().current().to_string(),
                after.saturating_sub(before) as u64,
            )
        };
        progress.factors.fetch_add(accepted, Ordering::Relaxed);
        progress.set_current(current);
        outbox.push_all(batch);
        if done {
            break;
        }
    }

    drop(inbox);
    outbox.close(config.network.drain_grace()).await;
    progress.stop();
    if let Some(reporter) = reporter {
        let _ = tokio::task::spawn_blocking(move || reporter.join()).await;
    }

    let report = lock_or_recover(&state).report();
    let report = report.ok_or_else(|| anyhow::anyhow!("coordinator inbox closed before completion"))?;
    publish(&report, options.results.as_deref())?;
    Ok(report)
}

fn publish(report: &FactorReport, results: Option<&std::path::Path>) -> Result<()> {
    let factors = report
        .factors
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" * ");
    info!(
        n = %report.original,
        factors = %factors,
        elapsed_ms = report.elapsed_ms,
        bits = report.bits,
        winner = report.winning_kind.map_or("none", |k| k.name()),
        "factorization results"
    );
    if let Some(path) = results {
        results::save(path, report)?;
        info!(path = %path.display(), "results written");
    }
    Ok(())
}
