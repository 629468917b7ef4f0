//! # Dispatcher — Per-Algorithm Work Partitioning
//!
//! One dispatcher exists per [`FactorKind`]. It keeps an insertion-ordered
//! table of the workers that registered with it and, for each target number
//! the coordinator broadcasts, splits that kind's search space across them.
//! When a worker reports `failed`, the dispatcher hands it the next piece of
//! the space; when it reports `factor-found`, the record is forwarded to the
//! coordinator unchanged.
//!
//! ## Partitioning
//!
//! | Kind | Space | Per-worker piece |
//! |------|-------|------------------|
//! | TrialUp | `[2, isqrt(n)]` ascending | contiguous chunk of `increment` |
//! | TrialDown | `[2, isqrt(n)]` descending | contiguous chunk of `increment` |
//! | Fermat | `a ≥ isqrt(n) + 1` | start offset by `attempts` per worker |
//! | PollardP1 | exponent bound | shared lower bound, upper grows by `step` |
//!
//! `increment = min(ceil(len / workers), cap)`, never below 1. Chunks never
//! overlap and are clamped to the round's range; once the range is used up
//! further requests get nothing.
//!
//! ## Pollard rebalancing
//!
//! A failed Pollard report is classified against the dispatcher's own
//! `base`/`lower`/`upper`/`power` tracking (see [`RetryCause`]), so knowledge
//! one worker gained about the smoothness bound is shared with the rest.
//!
//! The state machine is synchronous (`handle(message) -> Vec<Outbound>`); the
//! [`spawn`] driver owns the socket and the outbox.

use anyhow::Result;
use rug::Integer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{FleetConfig, SearchConfig};
use crate::error::FactorError;
use crate::kind::FactorKind;
use crate::progress::Progress;
use crate::record::{Endpoint, Message, SearchState, WorkRecord};
use crate::transport::{Outbound, Outbox, Transport};

/// Why a Pollard worker's round failed, as judged by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    /// The worker moved to a newer base; the dispatcher adopts it.
    NewerBase,
    /// The midpoint bound was too small.
    BoundTooSmall,
    /// The midpoint bound was too large.
    BoundTooLarge,
    /// Anything else, including a worker still on an older base.
    Reset,
}

/// Dispatcher-side knowledge about the Pollard smoothness bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollardTracker {
    pub base: Integer,
    /// Largest bound known to be too small.
    pub lower: Integer,
    pub upper: Integer,
    /// `base^(lower!) mod n`, once some worker has reported it.
    pub power: Option<Integer>,
}

impl PollardTracker {
    fn new(initial_upper: u64) -> Self {
        PollardTracker {
            base: Integer::from(2u32),
            lower: Integer::from(1u32),
            upper: Integer::from(initial_upper),
            power: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Frontier {
    /// `next` is the next lower bound (TrialUp) or upper bound (TrialDown) to hand out.
    Trial {
        lower: Integer,
        upper: Integer,
        increment: Integer,
        next: Integer,
    },
    Fermat { next_start: Integer },
    Pollard(PollardTracker),
}

#[derive(Debug, Clone)]
struct Round {
    template: WorkRecord,
    frontier: Frontier,
}

#[derive(Debug, Clone)]
struct WorkerSlot {
    endpoint: Endpoint,
    last_issued: Option<SearchState>,
}

pub struct Dispatcher {
    kind: FactorKind,
    endpoint: Endpoint,
    coordinator: Endpoint,
    /// Worker in whose process this dispatcher runs; it learns about
    /// termination from the dispatcher exiting rather than from a message.
    host: Option<Endpoint>,
    search: SearchConfig,
    workers: Vec<WorkerSlot>,
    round: Option<Round>,
    terminated: bool,
}

impl Dispatcher {
    pub fn new(
        kind: FactorKind,
        endpoint: Endpoint,
        coordinator: Endpoint,
        host: Option<Endpoint>,
        search: SearchConfig,
    ) -> Self {
        Dispatcher {
            kind,
            endpoint,
            coordinator,
            host,
            search,
            workers: Vec::new(),
            round: None,
            terminated: false,
        }
    }

    pub fn kind(&self) -> FactorKind {
        self.kind
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Registered workers in registration order.
    pub fn workers(&self) -> impl Iterator<Item = &Endpoint> {
        self.workers.iter().map(|slot| &slot.endpoint)
    }

    /// Last sub-range issued to `worker`.
    pub fn last_issued(&self, worker: &Endpoint) -> Option<&SearchState> {
        self.workers
            .iter()
            .find(|slot| &slot.endpoint == worker)
            .and_then(|slot| slot.last_issued.as_ref())
    }

    /// Number of the active round.
    pub fn target(&self) -> Option<&Integer> {
        self.round.as_ref().map(|r| r.template.number())
    }

    pub fn pollard_tracker(&self) -> Option<&PollardTracker> {
        match &self.round.as_ref()?.frontier {
            Frontier::Pollard(t) => Some(t),
            _ => None,
        }
    }

    /// Announce this dispatcher to the coordinator.
    pub fn startup(&self) -> Vec<Outbound> {
        vec![Outbound::new(
            self.coordinator.clone(),
            Message::RegisterSubserver {
                kind: self.kind,
                endpoint: self.endpoint.clone(),
            },
        )]
    }

    pub fn handle(&mut self, message: Message) -> Vec<Outbound> {
        if self.terminated {
            debug!(kind = %self.kind, intent = message.intent(), "ignoring message after terminate");
            return Vec::new();
        }
        match message {
            Message::Start { number } | Message::NewValue { number } => self.begin_round(number),
            Message::Register { kind, reply_to } => {
                if kind != self.kind {
                    warn!(kind = %self.kind, worker_kind = %kind, worker = %reply_to, "worker registered with the wrong dispatcher");
                    return Vec::new();
                }
                self.register(reply_to)
            }
            Message::Failed(record) => self.on_failed(record),
            Message::FactorFound(record) => {
                info!(kind = %self.kind, factor = ?record.factor().map(|f| f.to_string()), "forwarding factor to coordinator");
                vec![Outbound::new(self.coordinator.clone(), Message::FactorFound(record))]
            }
            Message::Terminate => self.terminate(),
            other => {
                debug!(kind = %self.kind, intent = other.intent(), "ignoring message");
                Vec::new()
            }
        }
    }

    fn begin_round(&mut self, number: Integer) -> Vec<Outbound> {
        let template = match WorkRecord::new(number, self.kind, self.search.fermat_attempts) {
            Ok(template) => template,
            Err(e) => {
                warn!(kind = %self.kind, error = %e, "refusing target");
                return Vec::new();
            }
        };
        let root = template.root().clone();
        let frontier = match self.kind {
            FactorKind::TrialUp | FactorKind::TrialDown => {
                let lower = Integer::from(2u32);
                let upper = root;
                let increment = trial_increment(&lower, &upper, self.workers.len(), self.search.trial_increment_cap);
                let next = if self.kind == FactorKind::TrialUp {
                    lower.clone()
                } else {
                    upper.clone()
                };
                Frontier::Trial {
                    lower,
                    upper,
                    increment,
                    next,
                }
            }
            FactorKind::Fermat => Frontier::Fermat {
                next_start: root + 1u32,
            },
            FactorKind::PollardP1 => {
                let mut tracker = PollardTracker::new(self.search.pollard_initial_upper);
                // each worker's bound grows from the shared lower bound
                tracker.upper = tracker.lower.clone();
                Frontier::Pollard(tracker)
            }
        };
        info!(kind = %self.kind, number = %template.number(), workers = self.workers.len(), "partitioning new target");
        self.round = Some(Round { template, frontier });

        let mut out = Vec::new();
        for index in 0..self.workers.len() {
            if let Some(outbound) = self.issue_next(index) {
                out.push(outbound);
            }
        }
        out
    }

    fn register(&mut self, worker: Endpoint) -> Vec<Outbound> {
        if self.workers.iter().any(|slot| slot.endpoint == worker) {
            debug!(kind = %self.kind, %worker, "duplicate registration");
            return Vec::new();
        }
        info!(kind = %self.kind, %worker, position = self.workers.len(), "worker registered");
        self.workers.push(WorkerSlot {
            endpoint: worker,
            last_issued: None,
        });
        let index = self.workers.len() - 1;
        self.issue_next(index).into_iter().collect()
    }

    /// Hand the worker at `index` the next unissued piece of the active round.
    fn issue_next(&mut self, index: usize) -> Option<Outbound> {
        let round = self.round.as_mut()?;
        let mut record = round.template.clone();
        let issued = next_piece(&mut round.frontier, &mut record, &self.search);
        match issued {
            Ok(true) => {}
            Ok(false) => {
                debug!(kind = %self.kind, worker = %self.workers[index].endpoint, "search space exhausted");
                return None;
            }
            Err(e) => {
                warn!(kind = %self.kind, error = %e, "could not build sub-range");
                return None;
            }
        }
        Some(self.dispatch(index, record))
    }

    fn dispatch(&mut self, index: usize, mut record: WorkRecord) -> Outbound {
        let slot = &mut self.workers[index];
        record.reply_to = Some(slot.endpoint.clone());
        slot.last_issued = Some(record.state().clone());
        Outbound::new(slot.endpoint.clone(), Message::Run(record))
    }

    fn on_failed(&mut self, mut record: WorkRecord) -> Vec<Outbound> {
        let Some(round) = self.round.as_mut() else {
            debug!(kind = %self.kind, "failed report with no active round");
            return Vec::new();
        };
        if record.number() != round.template.number() {
            debug!(kind = %self.kind, number = %record.number(), "dropping stale failed report");
            return Vec::new();
        }
        let Some(worker) = record.reply_to.clone() else {
            warn!(kind = %self.kind, "failed report without a reply endpoint");
            return Vec::new();
        };
        let index = match self.workers.iter().position(|slot| slot.endpoint == worker) {
            Some(index) => index,
            None => {
                info!(kind = %self.kind, %worker, "unregistered worker reported, adding it");
                self.workers.push(WorkerSlot {
                    endpoint: worker,
                    last_issued: None,
                });
                self.workers.len() - 1
            }
        };

        if let Frontier::Pollard(tracker) = &mut round.frontier {
            match rebalance_pollard(tracker, &mut record, &self.search) {
                Ok(cause) => {
                    debug!(kind = %self.kind, ?cause, base = %tracker.base, lower = %tracker.lower, upper = %tracker.upper, "pollard retry");
                }
                Err(e) => {
                    warn!(kind = %self.kind, error = %e, "pollard report rejected");
                    return Vec::new();
                }
            }
            return vec![self.dispatch(index, record)];
        }
        self.issue_next(index).into_iter().collect()
    }

    fn terminate(&mut self) -> Vec<Outbound> {
        self.terminated = true;
        info!(kind = %self.kind, workers = self.workers.len(), "terminating");
        self.workers
            .iter()
            .filter(|slot| Some(&slot.endpoint) != self.host.as_ref())
            .map(|slot| Outbound::new(slot.endpoint.clone(), Message::Terminate))
            .collect()
    }
}

/// `min(ceil((upper - lower + 1) / workers), cap)`, at least 1.
pub fn trial_increment(lower: &Integer, upper: &Integer, workers: usize, cap: u64) -> Integer {
    let len = Integer::from(upper - lower) + 1u32;
    let workers = workers.max(1) as u64;
    let mut increment = (len + (workers - 1)) / workers;
    if increment > cap {
        increment = Integer::from(cap);
    }
    if increment < 1 {
        increment = Integer::from(1u32);
    }
    increment
}

/// Write the next piece of `frontier` into `record`; false once nothing is left.
fn next_piece(frontier: &mut Frontier, record: &mut WorkRecord, search: &SearchConfig) -> Result<bool, FactorError> {
    match frontier {
        Frontier::Trial {
            lower,
            upper,
            increment,
            next,
        } => {
            if record.kind() == FactorKind::TrialUp {
                if *next > *upper {
                    return Ok(false);
                }
                let lo = next.clone();
                let hi = Integer::from(&lo + &*increment) - 1u32;
                let hi = if hi > *upper { upper.clone() } else { hi };
                *next = Integer::from(&hi + 1u32);
                record.set_trial_bounds(lo, hi)?;
            } else {
                if *next < *lower {
                    return Ok(false);
                }
                let hi = next.clone();
                let lo = Integer::from(&hi - &*increment) + 1u32;
                let lo = if lo < *lower { lower.clone() } else { lo };
                *next = Integer::from(&lo - 1u32);
                record.set_trial_bounds(lo, hi)?;
            }
        }
        Frontier::Fermat { next_start } => {
            let start = next_start.clone();
            *next_start += search.fermat_attempts;
            record.set_fermat_start(start)?;
        }
        Frontier::Pollard(tracker) => {
            let root = record.root().clone();
            tracker.upper += search.pollard_step;
            if tracker.upper > root {
                tracker.upper = root;
            }
            let p = record.pollard_mut()?;
            p.reset_base(tracker.base.clone(), &tracker.upper);
            p.lower = tracker.lower.clone();
            if let Some(power) = &tracker.power {
                p.power = power.clone();
                p.cursor = Integer::from(&tracker.lower + 1u32);
            }
        }
    }
    Ok(true)
}

/// Classify a failed Pollard round and adjust both the tracker and the
/// worker's record for its next round.
pub fn rebalance_pollard(
    tracker: &mut PollardTracker,
    record: &mut WorkRecord,
    search: &SearchConfig,
) -> Result<RetryCause, FactorError> {
    let root = record.root().clone();
    let p = record.pollard_mut()?.clone();
    let last = p.last_bound.clone();

    let cause = if p.base > tracker.base {
        tracker.base = p.base.clone();
        tracker.lower = Integer::from(1u32);
        tracker.upper = Integer::from(search.pollard_initial_upper);
        tracker.power = None;
        RetryCause::NewerBase
    } else if p.base == tracker.base && last.as_ref() == Some(&p.lower) {
        let known = tracker.power.clone().filter(|_| tracker.lower > p.lower);
        match known {
            Some(power) => {
                let lower = tracker.lower.clone();
                let state = record.pollard_mut()?;
                state.power = power;
                state.cursor = Integer::from(&lower + 1u32);
                state.lower = lower;
                if state.upper <= state.lower {
                    state.upper = Integer::from(&state.lower + search.pollard_step);
                }
                let upper = state.upper.clone();
                record.set_pollard_upper(upper)?;
            }
            None => {
                tracker.lower = p.lower.clone();
                tracker.power = Some(p.power.clone());
            }
        }
        RetryCause::BoundTooSmall
    } else if p.base == tracker.base && last.as_ref() == Some(&p.upper) {
        if p.upper < tracker.upper {
            tracker.upper = p.upper.clone();
        } else if tracker.upper > p.lower {
            record.set_pollard_upper(tracker.upper.clone())?;
        }
        RetryCause::BoundTooLarge
    } else {
        record.reset_pollard_base(tracker.base.clone())?;
        tracker.upper += search.pollard_step;
        if tracker.upper > root {
            tracker.upper = root;
        }
        record.set_pollard_upper(tracker.upper.clone())?;
        RetryCause::Reset
    };

    record.pollard_mut()?.last_bound = None;
    Ok(cause)
}

/// A dispatcher running on its own task.
pub struct DispatcherHandle {
    pub kind: FactorKind,
    pub endpoint: Endpoint,
    /// Set once the listener is bound.
    pub ready: Arc<AtomicBool>,
    pub join: JoinHandle<Result<()>>,
}

impl DispatcherHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Bind the well-known port for `kind` and serve until `terminate`.
pub fn spawn<T: Transport>(
    transport: T,
    config: &FleetConfig,
    kind: FactorKind,
    coordinator: Endpoint,
    host: Option<Endpoint>,
) -> DispatcherHandle {
    let ready = Arc::new(AtomicBool::new(false));
    let endpoint = Endpoint::new(config.network.advertise_host.clone(), config.ports.dispatcher(kind));
    let join = tokio::spawn(serve(
        transport,
        config.clone(),
        kind,
        coordinator,
        host,
        Arc::clone(&ready),
    ));
    DispatcherHandle {
        kind,
        endpoint,
        ready,
        join,
    }
}

async fn serve<T: Transport>(
    transport: T,
    config: FleetConfig,
    kind: FactorKind,
    coordinator: Endpoint,
    host: Option<Endpoint>,
    ready: Arc<AtomicBool>,
) -> Result<()> {
    let (endpoint, mut inbox) = transport
        .listen(&config.network.bind_host, &config.network.advertise_host, config.ports.dispatcher(kind))
        .await?;
    info!(%kind, %endpoint, "dispatcher listening");

    let mut dispatcher = Dispatcher::new(kind, endpoint, coordinator, host, config.search.clone());
    let progress = Progress::new(format!("dispatcher/{}", kind));
    let reporter = progress.start_reporter(std::time::Duration::from_secs(config.network.progress_interval_secs));
    let mut outbox = Outbox::new(transport, config.network.retry_policy());
    outbox.push_all(dispatcher.startup());
    ready.store(true, Ordering::Release);

    while let Some(message) = inbox.recv().await {
        match &message {
            Message::Failed(_) => {
                progress.failures.fetch_add(1, Ordering::Relaxed);
            }
            Message::FactorFound(_) => {
                progress.factors.fetch_add(1, Ordering::Relaxed);
            }
            Message::Start { number } | Message::NewValue { number } => progress.set_current(number.to_string()),
            _ => {}
        }
        let batch = dispatcher.handle(message);
        let done = dispatcher.is_terminated();
        let runs = batch
            .iter()
            .filter(|o| matches!(o.message, Message::Run(_)))
            .count() as u64;
        progress.rounds.fetch_add(runs, Ordering::Relaxed);
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
    info!(%kind, "dispatcher finished");
    Ok(())
}
