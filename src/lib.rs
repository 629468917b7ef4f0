pub mod algorithms;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod kind;
pub mod progress;
pub mod race;
pub mod record;
pub mod results;
pub mod source;
pub mod transport;
pub mod worker;

use rug::integer::IsPrime;
use rug::Integer;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Two-round Miller-Rabin pre-screening: run 2 fast rounds first, full rounds only for survivors.
pub fn mr_screened_test(candidate: &Integer, mr_rounds: u32) -> IsPrime {
    if mr_rounds > 2 && candidate.is_probably_prime(2) == IsPrime::No {
        return IsPrime::No;
    }
    candidate.is_probably_prime(mr_rounds)
}

/// True for primes (and for composites that survive `mr_rounds` Miller-Rabin rounds).
pub fn is_probable_prime(n: &Integer, mr_rounds: u32) -> bool {
    mr_screened_test(n, mr_rounds) != IsPrime::No
}
