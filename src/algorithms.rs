//! # Algorithms — The Four Bounded Factor Searches
//!
//! Every search works over one bounded slice of its search space and either
//! returns a divisor of `n` or reports that the slice held none, together with
//! whatever state the next slice needs so no work is repeated.
//!
//! | Function | Slice | Resume contract |
//! |----------|-------|-----------------|
//! | `trial_up` | odd candidates in `[lo, hi]`, ascending | next slice starts at `hi + 1` |
//! | `trial_down` | odd candidates in `[lo, hi]`, descending, tested with gcd | next slice ends at `lo - 1` |
//! | `fermat` | `attempts` values of `a` from `start` | next call starts at `start + attempts` |
//! | `pollard_p1` | exponents `cursor..=bound` | too small: resume at `bound + 1` with the returned power |
//!
//! ## Pollard's p-1
//!
//! The accumulated power is `a = base^(k!) mod n`, built one exponent at a
//! time (`a = a^i mod n` for `i = cursor..=bound`). If some prime `p | n` has
//! `p - 1` dividing `bound!`, then `p | gcd(a - 1, n)`. A gcd of 1 means the
//! bound was too small, a gcd of `n` means every factor became smooth at once
//! and the bound was too large.
//!
//! ## Fermat
//!
//! Looks for `n = a² − b²`, so `n = (a − b)(a + b)`. `a` starts above
//! `isqrt(n)` and `b² = a² − n` is maintained incrementally
//! (`(a+1)² − a² = 2a + 1`).

use rug::Integer;

use crate::error::FactorError;

/// `(s, r)` with `n == s² + r` and `n < (s + 1)²`.
pub fn exact_isqrt(n: &Integer) -> Result<(Integer, Integer), FactorError> {
    if *n < 0 {
        return Err(FactorError::NegativeSquareRoot { value: n.clone() });
    }
    Ok(n.clone().sqrt_rem(Integer::new()))
}

/// Smallest odd divisor of `n` in `[lo, hi]`; 2 for even `n`, 1 for `n == 1`.
pub fn trial_up(n: &Integer, lo: &Integer, hi: &Integer) -> Option<Integer> {
    if *n == 1 {
        return Some(Integer::from(1u32));
    }
    if n.is_even() {
        return Some(Integer::from(2u32));
    }

    let mut i = lo.clone();
    if i.is_even() {
        i += 1u32;
    }
    // 1 divides everything and is never a useful answer
    if i < 3 {
        i = Integer::from(3u32);
    }

    while &i <= hi {
        if n.is_divisible(&i) {
            return Some(i);
        }
        i += 2u32;
    }
    None
}

/// First `gcd(n, i) > 1` scanning odd `i` from `hi` down to `lo`.
///
/// Testing with gcd instead of a remainder test means a composite candidate that
/// shares a factor with `n` still yields that factor.
pub fn trial_down(n: &Integer, lo: &Integer, hi: &Integer) -> Option<Integer> {
    if *n == 1 {
        return Some(Integer::from(1u32));
    }
    if n.is_even() {
        return Some(Integer::from(2u32));
    }

    let mut i = hi.clone();
    if i.is_even() {
        i -= 1u32;
    }

    while &i >= lo && i > 1 {
        let g = Integer::from(n.gcd_ref(&i));
        if g > 1 {
            return Some(g);
        }
        i -= 2u32;
    }
    None
}

/// Fermat's method over `attempts` consecutive values of `a` starting at `start`.
///
/// `start` must be at least `isqrt(n) + 1`. Returns `Ok(None)` when the slice
/// held no representation; the caller resumes at `start + attempts`.
pub fn fermat(n: &Integer, start: &Integer, attempts: u64) -> Result<Option<Integer>, FactorError> {
    if n.is_even() {
        return Ok(Some(Integer::from(2u32)));
    }

    let (root, rem) = exact_isqrt(n)?;
    if rem == 0 {
        return Ok(Some(root));
    }
    if *start <= root {
        return Err(FactorError::FermatStartTooLow {
            start: start.clone(),
            minimum: root + 1u32,
        });
    }

    let mut a = start.clone();
    let mut b_squared = Integer::from(a.square_ref()) - n;

    for _ in 0..attempts {
        let (b, r) = exact_isqrt(&b_squared)?;
        if r == 0 {
            return Ok(Some(a - b));
        }
        // (a+1)² - n = a² - n + 2a + 1
        b_squared += &a;
        b_squared += &a;
        b_squared += 1u32;
        a += 1u32;
    }
    Ok(None)
}

/// Raw Pollard p-1 round: raise `power` through exponents `cursor..=bound`.
///
/// Returns `(gcd(power − 1, n), power)`. See [`P1Outcome`] for how the gcd
/// is interpreted.
pub fn pollard_p1(
    n: &Integer,
    power: &Integer,
    cursor: &Integer,
    bound: &Integer,
) -> (Integer, Integer) {
    if n.is_even() {
        return (Integer::from(2u32), power.clone());
    }

    let mut power = power.clone();
    let mut i = cursor.clone();
    while &i <= bound {
        if power.pow_mod_mut(&i, n).is_err() {
            break;
        }
        // 1 raised to anything stays 1
        if power == 1 {
            break;
        }
        i += 1u32;
    }

    let g = Integer::from(&power - 1u32).gcd(n);
    (g, power)
}

/// Typed interpretation of a Pollard p-1 round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum P1Outcome {
    Factor(Integer),
    /// gcd was 1: continue from `bound + 1` with `power`.
    BoundTooSmall { power: Integer },
    /// gcd was `n`: retry with a smaller bound from the base.
    BoundTooLarge,
}

pub fn pollard_p1_round(
    n: &Integer,
    power: &Integer,
    cursor: &Integer,
    bound: &Integer,
) -> P1Outcome {
    let (g, power) = pollard_p1(n, power, cursor, bound);
    if g == 1 {
        P1Outcome::BoundTooSmall { power }
    } else if &g == n {
        P1Outcome::BoundTooLarge
    } else {
        P1Outcome::Factor(g)
    }
}
