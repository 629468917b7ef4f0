//! # Record — Wire Messages and Per-Kind Search State
//!
//! Every exchange between tiers is one [`Message`]. The `intent` tag selects
//! the variant, and each variant carries only the fields it needs. Search
//! work travels as a [`WorkRecord`]: the number under search, the algorithm
//! kind, that kind's resumable state, and (once found) a validated factor.
//!
//! ## Intents
//!
//! | Intent | Direction | Payload |
//! |--------|-----------|---------|
//! | `new-client` | worker → coordinator | worker endpoint |
//! | `assign` | coordinator → worker | kind, promotion flag, dispatcher endpoint |
//! | `register-subserver` | dispatcher → coordinator → parked workers | kind, dispatcher endpoint |
//! | `hosting-failed` | promoted worker → coordinator | kind, worker endpoint |
//! | `register` | worker → dispatcher | worker endpoint |
//! | `run` | dispatcher → worker | record with a fresh sub-range |
//! | `failed` | worker → dispatcher | record with resume state |
//! | `factor-found` | worker → dispatcher → coordinator | record with factor |
//! | `start`, `new-value` | coordinator → dispatchers | target number |
//! | `terminate` | downward, tier by tier | — |
//!
//! Unknown intents decode to [`Message::Unknown`] and are ignored by every tier.

use rug::Integer;
use serde::{Deserialize, Serialize};

use crate::algorithms::exact_isqrt;
use crate::error::FactorError;
use crate::kind::FactorKind;

/// A reachable `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Pollard p-1 state carried between rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollardState {
    pub base: Integer,
    /// `base^((cursor - 1)!) mod number`.
    pub power: Integer,
    /// Next exponent to multiply in.
    pub cursor: Integer,
    /// Largest bound known to be too small.
    pub lower: Integer,
    /// Smallest bound known (or assumed) to be too large.
    pub upper: Integer,
    /// Midpoint bound of the round that produced this record, if any.
    #[serde(default)]
    pub last_bound: Option<Integer>,
}

impl PollardState {
    pub fn new(base: Integer, root: &Integer) -> Self {
        PollardState {
            power: base.clone(),
            base,
            cursor: Integer::from(1u32),
            lower: Integer::from(1u32),
            upper: root.clone(),
            last_bound: None,
        }
    }

    /// Switch to `base`, discarding all accumulated state.
    pub fn reset_base(&mut self, base: Integer, root: &Integer) {
        *self = PollardState::new(base, root);
    }

    /// The current base failed on every bound; move to the next one.
    pub fn increment_base(&mut self, root: &Integer) {
        let next = Integer::from(&self.base + 1u32);
        self.reset_base(next, root);
    }

    /// Restart exponent accumulation from the base, keeping the bracket.
    pub fn restart_power(&mut self) {
        self.power = self.base.clone();
        self.cursor = Integer::from(1u32);
    }

    /// Midpoint of the `[lower, upper]` bracket.
    pub fn midpoint_bound(&self) -> Integer {
        Integer::from(&self.lower + &self.upper) / 2u32
    }

    /// True once no untried bound lies strictly between `lower` and `upper`.
    pub fn exhausted(&self) -> bool {
        Integer::from(&self.upper - &self.lower) <= 1
    }
}

/// Per-kind resumable search state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchState {
    /// Closed interval of candidate divisors (both trial kinds).
    Trial { lower: Integer, upper: Integer },
    Fermat { start: Integer, attempts: u64 },
    Pollard(PollardState),
}

/// The unit of search work exchanged between tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    number: Integer,
    root: Integer,
    kind: FactorKind,
    state: SearchState,
    factor: Option<Integer>,
    /// Endpoint of the worker this record belongs to.
    pub reply_to: Option<Endpoint>,
}

impl WorkRecord {
    /// Fresh record for `number` with the kind's default starting state.
    pub fn new(number: Integer, kind: FactorKind, attempts: u64) -> Result<Self, FactorError> {
        if number < 2 {
            return Err(FactorError::InvalidNumber { value: number });
        }
        let (root, _) = exact_isqrt(&number)?;
        let state = match kind {
            FactorKind::TrialUp | FactorKind::TrialDown => SearchState::Trial {
                lower: Integer::from(2u32),
                upper: root.clone(),
            },
            FactorKind::Fermat => SearchState::Fermat {
                start: Integer::from(&root + 1u32),
                attempts,
            },
            FactorKind::PollardP1 => SearchState::Pollard(PollardState::new(Integer::from(2u32), &root)),
        };
        Ok(WorkRecord {
            number,
            root,
            kind,
            state,
            factor: None,
            reply_to: None,
        })
    }

    pub fn number(&self) -> &Integer {
        &self.number
    }

    /// `isqrt(number)`.
    pub fn root(&self) -> &Integer {
        &self.root
    }

    pub fn kind(&self) -> FactorKind {
        self.kind
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn factor(&self) -> Option<&Integer> {
        self.factor.as_ref()
    }

    /// Record a discovered factor. Rejects anything that does not divide `number`.
    pub fn add_factor(&mut self, factor: Integer) -> Result<(), FactorError> {
        if factor == 0 || !self.number.is_divisible(&factor) {
            return Err(FactorError::NotADivisor {
                factor,
                number: self.number.clone(),
            });
        }
        self.factor = Some(factor);
        Ok(())
    }

    pub fn trial_bounds(&self) -> Option<(&Integer, &Integer)> {
        match &self.state {
            SearchState::Trial { lower, upper } => Some((lower, upper)),
            _ => None,
        }
    }

    /// Set the trial interval; `upper` is clamped to `isqrt(number)`.
    pub fn set_trial_bounds(&mut self, lower: Integer, upper: Integer) -> Result<(), FactorError> {
        if !matches!(self.kind, FactorKind::TrialUp | FactorKind::TrialDown) {
            return Err(FactorError::WrongStateForKind {
                kind: self.kind,
                operation: "set_trial_bounds",
            });
        }
        let upper = if upper > self.root { self.root.clone() } else { upper };
        if lower > upper {
            return Err(FactorError::InvalidBounds { lower, upper });
        }
        self.state = SearchState::Trial { lower, upper };
        Ok(())
    }

    pub fn fermat_start(&self) -> Option<(&Integer, u64)> {
        match &self.state {
            SearchState::Fermat { start, attempts } => Some((start, *attempts)),
            _ => None,
        }
    }

    /// Move the Fermat start. Must be at least `isqrt(number) + 1`.
    pub fn set_fermat_start(&mut self, start: Integer) -> Result<(), FactorError> {
        let SearchState::Fermat { start: current, .. } = &mut self.state else {
            return Err(FactorError::WrongStateForKind {
                kind: self.kind,
                operation: "set_fermat_start",
            });
        };
        if start <= self.root {
            return Err(FactorError::FermatStartTooLow {
                start,
                minimum: Integer::from(&self.root + 1u32),
            });
        }
        *current = start;
        Ok(())
    }

    pub fn pollard(&self) -> Option<&PollardState> {
        match &self.state {
            SearchState::Pollard(p) => Some(p),
            _ => None,
        }
    }

    pub fn pollard_mut(&mut self) -> Result<&mut PollardState, FactorError> {
        match &mut self.state {
            SearchState::Pollard(p) => Ok(p),
            _ => Err(FactorError::WrongStateForKind {
                kind: self.kind,
                operation: "pollard_mut",
            }),
        }
    }

    /// Set the Pollard upper bound, clamped to `isqrt(number)`.
    pub fn set_pollard_upper(&mut self, upper: Integer) -> Result<(), FactorError> {
        let root = self.root.clone();
        let p = self.pollard_mut()?;
        p.upper = if upper > root { root } else { upper };
        Ok(())
    }

    /// Replace the Pollard state with a fresh one for `base`.
    pub fn reset_pollard_base(&mut self, base: Integer) -> Result<(), FactorError> {
        let root = self.root.clone();
        self.pollard_mut()?.reset_base(base, &root);
        Ok(())
    }

    pub fn increment_pollard_base(&mut self) -> Result<(), FactorError> {
        let root = self.root.clone();
        self.pollard_mut()?.increment_base(&root);
        Ok(())
    }
}

/// Coordinator's answer to `new-client`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub kind: FactorKind,
    /// Host the dispatcher for `kind` inside this worker's process.
    pub promote: bool,
    pub number: Integer,
    /// Dispatcher to register with, when already known.
    #[serde(default)]
    pub dispatcher: Option<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "kebab-case")]
pub enum Message {
    NewClient { reply_to: Endpoint },
    Assign(Assignment),
    RegisterSubserver { kind: FactorKind, endpoint: Endpoint },
    /// A promoted worker could not bring its dispatcher up.
    HostingFailed { kind: FactorKind, reply_to: Endpoint },
    Register { kind: FactorKind, reply_to: Endpoint },
    Run(WorkRecord),
    Failed(WorkRecord),
    FactorFound(WorkRecord),
    Start { number: Integer },
    NewValue { number: Integer },
    Terminate,
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn intent(&self) -> &'static str {
        match self {
            Message::NewClient { .. } => "new-client",
            Message::Assign(_) => "assign",
            Message::RegisterSubserver { .. } => "register-subserver",
            Message::HostingFailed { .. } => "hosting-failed",
            Message::Register { .. } => "register",
            Message::Run(_) => "run",
            Message::Failed(_) => "failed",
            Message::FactorFound(_) => "factor-found",
            Message::Start { .. } => "start",
            Message::NewValue { .. } => "new-value",
            Message::Terminate => "terminate",
            Message::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Integer {
        Integer::from(6563u32 * 9311)
    }

    #[test]
    fn new_rejects_numbers_below_two() {
        assert!(matches!(
            WorkRecord::new(Integer::from(1u32), FactorKind::TrialUp, 1000),
            Err(FactorError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn default_states_per_kind() {
        let n = scenario();
        let up = WorkRecord::new(n.clone(), FactorKind::TrialUp, 1000).unwrap();
        assert_eq!(up.trial_bounds(), Some((&Integer::from(2u32), &Integer::from(7817u32))));

        let fermat = WorkRecord::new(n.clone(), FactorKind::Fermat, 1000).unwrap();
        assert_eq!(fermat.fermat_start(), Some((&Integer::from(7818u32), 1000)));

        let pollard = WorkRecord::new(n, FactorKind::PollardP1, 1000).unwrap();
        let p = pollard.pollard().unwrap();
        assert_eq!(p.base, 2u32);
        assert_eq!(p.power, 2u32);
        assert_eq!(p.cursor, 1u32);
        assert_eq!(p.upper, 7817u32);
    }

    #[test]
    fn add_factor_rejects_non_divisor_without_mutating() {
        let mut r = WorkRecord::new(scenario(), FactorKind::TrialUp, 1000).unwrap();
        assert!(r.add_factor(Integer::from(7u32)).is_err());
        assert!(r.add_factor(Integer::new()).is_err());
        assert!(r.factor().is_none());
        r.add_factor(Integer::from(9311u32)).unwrap();
        assert_eq!(r.factor(), Some(&Integer::from(9311u32)));
    }

    #[test]
    fn trial_upper_bound_is_clamped_to_root() {
        let mut r = WorkRecord::new(scenario(), FactorKind::TrialDown, 1000).unwrap();
        r.set_trial_bounds(Integer::from(100u32), Integer::from(1_000_000u32)).unwrap();
        assert_eq!(r.trial_bounds(), Some((&Integer::from(100u32), &Integer::from(7817u32))));
    }

    #[test]
    fn trial_bounds_reject_empty_interval() {
        let mut r = WorkRecord::new(scenario(), FactorKind::TrialUp, 1000).unwrap();
        let err = r.set_trial_bounds(Integer::from(9000u32), Integer::from(9500u32)).unwrap_err();
        assert!(matches!(err, FactorError::InvalidBounds { .. }));
        assert_eq!(r.trial_bounds(), Some((&Integer::from(2u32), &Integer::from(7817u32))));
    }

    #[test]
    fn fermat_start_validated_before_mutation() {
        let mut r = WorkRecord::new(scenario(), FactorKind::Fermat, 1000).unwrap();
        assert!(r.set_fermat_start(Integer::from(7817u32)).is_err());
        assert_eq!(r.fermat_start().unwrap().0, &Integer::from(7818u32));
        r.set_fermat_start(Integer::from(9000u32)).unwrap();
        assert_eq!(r.fermat_start().unwrap().0, &Integer::from(9000u32));
    }

    #[test]
    fn state_mutators_reject_wrong_kind() {
        let mut r = WorkRecord::new(scenario(), FactorKind::Fermat, 1000).unwrap();
        assert!(matches!(
            r.set_trial_bounds(Integer::from(2u32), Integer::from(3u32)),
            Err(FactorError::WrongStateForKind { .. })
        ));
        assert!(r.pollard_mut().is_err());
    }

    #[test]
    fn pollard_bracket_helpers() {
        let root = Integer::from(7817u32);
        let mut p = PollardState::new(Integer::from(2u32), &root);
        assert_eq!(p.midpoint_bound(), 3909u32);
        assert!(!p.exhausted());

        p.lower = Integer::from(18u32);
        p.upper = Integer::from(19u32);
        assert!(p.exhausted());

        p.power = Integer::from(12345u32);
        p.cursor = Integer::from(19u32);
        p.restart_power();
        assert_eq!(p.power, 2u32);
        assert_eq!(p.cursor, 1u32);
        assert_eq!(p.lower, 18u32);

        p.increment_base(&root);
        assert_eq!(p.base, 3u32);
        assert_eq!(p.power, 3u32);
        assert_eq!(p.lower, 1u32);
        assert_eq!(p.upper, root);
    }

    #[test]
    fn pollard_bracket_with_one_untried_bound_is_open() {
        let mut p = PollardState::new(Integer::from(2u32), &Integer::from(7817u32));
        p.lower = Integer::from(18u32);
        p.upper = Integer::from(20u32);
        assert!(!p.exhausted());
        assert_eq!(p.midpoint_bound(), 19u32);

        p.lower = Integer::from(19u32);
        assert!(p.exhausted());
        p.lower = Integer::from(18u32);
        p.upper = Integer::from(19u32);
        assert!(p.exhausted());
    }

    #[test]
    fn pollard_upper_clamped() {
        let mut r = WorkRecord::new(scenario(), FactorKind::PollardP1, 1000).unwrap();
        r.set_pollard_upper(Integer::from(50_000u32)).unwrap();
        assert_eq!(r.pollard().unwrap().upper, 7817u32);
    }

    #[test]
    fn message_json_carries_intent_tag() {
        let msg = Message::NewValue { number: scenario() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["intent"], "new-value");

        let mut r = WorkRecord::new(scenario(), FactorKind::PollardP1, 1000).unwrap();
        r.reply_to = Some(Endpoint::new("10.0.0.5", 40001));
        let msg = Message::Failed(r.clone());
        let back: Message = serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(back, Message::Failed(r));
    }

    #[test]
    fn hosting_failed_uses_kebab_intent() {
        let msg = Message::HostingFailed {
            kind: FactorKind::TrialDown,
            reply_to: Endpoint::new("10.0.0.5", 40001),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["intent"], "hosting-failed");
        assert_eq!(msg.intent(), "hosting-failed");
        assert_eq!(serde_json::from_value::<Message>(json).unwrap(), msg);
    }

    #[test]
    fn unknown_intent_is_tolerated() {
        let msg: Message = serde_json::from_str(r#"{"intent":"heartbeat","load":3}"#).unwrap();
        assert_eq!(msg, Message::Unknown);
        assert_eq!(msg.intent(), "unknown");
    }

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::new("node-7", 12486).to_string(), "node-7:12486");
    }
}
