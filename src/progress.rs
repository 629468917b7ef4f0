//! # Progress — Atomic Fleet Counters
//!
//! Shared between a node's message loop and a background reporter thread.
//! Counters are lock-free atomics; only the label of the current target sits
//! behind a Mutex (written once per new target, not per message).
//!
//! What the counters mean depends on the tier: a worker counts rounds it
//! searched, a dispatcher counts sub-ranges issued and failures received, the
//! coordinator counts factors accepted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

use crate::lock_or_recover;

pub struct Progress {
    /// Sub-ranges searched (worker) or issued (dispatcher).
    pub rounds: AtomicU64,
    pub failures: AtomicU64,
    pub factors: AtomicU64,
    pub current: Mutex<String>,
    role: String,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    pub fn new(role: impl Into<String>) -> Arc<Self> {
        Arc::new(Progress {
            rounds: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            factors: AtomicU64::new(0),
            current: Mutex::new(String::new()),
            role: role.into(),
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Log a status line every `interval` until [`Progress::stop`]. A zero
    /// interval disables the reporter.
    pub fn start_reporter(self: &Arc<Self>, interval: Duration) -> Option<thread::JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }
        let progress = Arc::clone(self);
        Some(thread::spawn(move || {
            // short sleeps so stop() is honored promptly
            let tick = interval.min(Duration::from_millis(250));
            let mut waited = Duration::ZERO;
            loop {
                thread::sleep(tick);
                if progress.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                waited += tick;
                if waited >= interval {
                    waited = Duration::ZERO;
                    progress.print_status();
                }
            }
        }))
    }

    pub fn set_current(&self, label: impl Into<String>) {
        *lock_or_recover(&self.current) = label.into();
    }

    pub fn print_status(&self) {
        let elapsed = self.start.elapsed();
        let rounds = self.rounds.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let factors = self.factors.load(Ordering::Relaxed);
        let current = lock_or_recover(&self.current).clone();
        let rate = if elapsed.as_secs() > 0 {
            rounds as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let h = elapsed.as_secs() / 3600;
        let m = (elapsed.as_secs() % 3600) / 60;
        let s = elapsed.as_secs() % 60;
        info!(
            role = %self.role,
            current = %current,
            rounds,
            rate = format_args!("{:.2}", rate),
            failures,
            factors,
            elapsed = format_args!("{:02}:{:02}:{:02}", h, m, s),
            "fleet progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let p = Progress::new("worker");
        assert_eq!(p.rounds.load(Ordering::Relaxed), 0);
        assert_eq!(p.failures.load(Ordering::Relaxed), 0);
        assert_eq!(p.factors.load(Ordering::Relaxed), 0);
        assert_eq!(*p.current.lock().unwrap(), "");
    }

    #[test]
    fn concurrent_increments_are_accurate() {
        let p = Progress::new("dispatcher");
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        p.rounds.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(p.rounds.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn set_current_replaces_label() {
        let p = Progress::new("coordinator");
        p.set_current("61108093");
        p.set_current("9311");
        assert_eq!(*p.current.lock().unwrap(), "9311");
    }

    #[test]
    fn print_status_with_zero_elapsed() {
        let p = Progress::new("worker");
        p.print_status();
    }

    #[test]
    fn zero_interval_disables_reporter() {
        let p = Progress::new("worker");
        assert!(p.start_reporter(Duration::ZERO).is_none());
    }

    #[test]
    fn reporter_exits_after_stop() {
        let p = Progress::new("worker");
        let handle = p.start_reporter(Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(60));
        p.stop();
        handle.join().unwrap();
        assert!(p.shutdown.load(Ordering::Relaxed));
    }
}
