use serde::{Deserialize, Serialize};

/// The four algorithm identities a worker or dispatcher specializes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    /// Trial division counting up from 2.
    TrialUp,
    /// Trial division counting down from isqrt(n), probing with gcd.
    TrialDown,
    Fermat,
    PollardP1,
}

impl FactorKind {
    /// Promotion and round-robin order.
    pub const ALL: [FactorKind; 4] = [
        FactorKind::TrialUp,
        FactorKind::TrialDown,
        FactorKind::Fermat,
        FactorKind::PollardP1,
    ];

    pub fn index(self) -> usize {
        match self {
            FactorKind::TrialUp => 0,
            FactorKind::TrialDown => 1,
            FactorKind::Fermat => 2,
            FactorKind::PollardP1 => 3,
        }
    }

    pub fn from_index(index: usize) -> FactorKind {
        FactorKind::ALL[index % FactorKind::ALL.len()]
    }

    /// Well-known dispatcher port when no configuration overrides it.
    pub fn default_port(self) -> u16 {
        match self {
            FactorKind::TrialUp => 12486,
            FactorKind::TrialDown => 10897,
            FactorKind::Fermat => 12458,
            FactorKind::PollardP1 => 11489,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FactorKind::TrialUp => "trial_up",
            FactorKind::TrialDown => "trial_down",
            FactorKind::Fermat => "fermat",
            FactorKind::PollardP1 => "pollard_p1",
        }
    }
}

impl std::fmt::Display for FactorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
