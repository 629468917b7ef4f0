//! Invariant violations raised at the point of mutation.
//!
//! Everything that can go wrong on the wire or at setup travels as
//! `anyhow::Error`; these are the few conditions that callers match on,
//! because they mean "the value you tried to store is wrong for this record".

use rug::Integer;

use crate::kind::FactorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorError {
    /// `add_factor` was handed a value that does not divide the record's number.
    NotADivisor { factor: Integer, number: Integer },
    /// A Fermat start value at or below `isqrt(number)`.
    FermatStartTooLow { start: Integer, minimum: Integer },
    /// Square root of a negative value.
    NegativeSquareRoot { value: Integer },
    /// A number the system cannot factor (below 2).
    InvalidNumber { value: Integer },
    /// A trial interval with `lower > upper` once clamped to `isqrt(number)`.
    InvalidBounds { lower: Integer, upper: Integer },
    /// A state mutation that does not apply to the record's kind.
    WrongStateForKind { kind: FactorKind, operation: &'static str },
}

impl std::fmt::Display for FactorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactorError::NotADivisor { factor, number } => {
                write!(f, "{} is not a factor of {}", factor, number)
            }
            FactorError::FermatStartTooLow { start, minimum } => write!(
                f,
                "Fermat start value {} is below the minimum {} (isqrt(n) + 1)",
                start, minimum
            ),
            FactorError::NegativeSquareRoot { value } => {
                write!(f, "cannot take the square root of negative value {}", value)
            }
            FactorError::InvalidNumber { value } => {
                write!(f, "{} cannot be factored (must be at least 2)", value)
            }
            FactorError::InvalidBounds { lower, upper } => {
                write!(f, "empty search interval [{}, {}]", lower, upper)
            }
            FactorError::WrongStateForKind { kind, operation } => {
                write!(f, "{} does not apply to a {} record", operation, kind)
            }
        }
    }
}

impl std::error::Error for FactorError {}
