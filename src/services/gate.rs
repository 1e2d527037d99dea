//! Global concurrency admission gate.
//!
//! The gate caps the number of requests that are in flight at once across
//! the whole process, independent of which API key sent them. It protects
//! the downstream handlers and database pool from overload; per-key
//! fairness is the rate limiter's job, not the gate's.
//!
//! The counter is volatile and process-local: it resets on restart and is
//! not shared between horizontally scaled instances.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-wide in-flight request counter with a fixed upper bound.
///
/// # Concurrency
///
/// `enter` performs an atomic compare-and-increment (`fetch_update`), so
/// two concurrent requests can never both observe spare capacity and
/// over-admit. The raw counter is never exposed; callers only see the
/// acquire/release contract.
#[derive(Debug)]
pub struct AdmissionGate {
    /// Maximum number of simultaneously admitted requests
    max_concurrent: usize,

    /// Current number of admitted requests that have not yet released
    in_flight: AtomicUsize,
}

impl AdmissionGate {
    /// Create a gate admitting at most `max_concurrent` requests at once.
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            max_concurrent,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Try to admit one request.
    ///
    /// Returns a token on success; the slot is held until the token is
    /// dropped. Returns `None` when the gate is at capacity, in which case
    /// nothing was acquired and nothing needs releasing.
    pub fn enter(self: &Arc<Self>) -> Option<InFlightToken> {
        let admitted = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < self.max_concurrent {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok();

        if admitted {
            Some(InFlightToken {
                gate: Arc::clone(self),
            })
        } else {
            None
        }
    }

    /// Number of requests currently holding a token. Test visibility only.
    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// RAII handle for one admitted request.
///
/// Dropping the token releases the slot exactly once, on every exit path:
/// handler success, handler error, a downstream rate-limit rejection, or
/// task cancellation. Holding the release in `Drop` is what prevents
/// permanent capacity leakage when a handler panics.
#[derive(Debug)]
pub struct InFlightToken {
    gate: Arc<AdmissionGate>,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn admits_up_to_capacity_then_rejects() {
        let gate = AdmissionGate::new(5);

        let mut tokens: Vec<_> = (0..5).map(|_| gate.enter().unwrap()).collect();
        assert_eq!(gate.in_flight(), 5);

        // 6th concurrent request is rejected while all slots are held
        assert!(gate.enter().is_none());

        // Releasing one slot admits the next request
        drop(tokens.pop());
        let readmitted = gate.enter();
        assert!(readmitted.is_some());
        assert_eq!(gate.in_flight(), 5);
    }

    #[test]
    fn token_drop_releases_exactly_once() {
        let gate = AdmissionGate::new(1);

        let token = gate.enter().unwrap();
        assert_eq!(gate.in_flight(), 1);

        drop(token);
        assert_eq!(gate.in_flight(), 0);

        // The slot is reusable after release
        let again = gate.enter().unwrap();
        assert_eq!(gate.in_flight(), 1);
        drop(again);
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn release_happens_on_failure_paths_too() {
        let gate = AdmissionGate::new(1);

        // Simulate a handler that fails after acquiring a slot: the token
        // is dropped during unwinding of the closure's scope.
        let result: Result<(), &str> = (|| {
            let _token = gate.enter().ok_or("rejected")?;
            Err("handler failed")
        })();

        assert!(result.is_err());
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn concurrent_storm_never_exceeds_capacity() {
        const MAX: usize = 8;
        const THREADS: usize = 32;
        const ITERATIONS: usize = 200;

        let gate = AdmissionGate::new(MAX);
        let observed_max = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let observed_max = Arc::clone(&observed_max);
                let barrier = Arc::clone(&barrier);

                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..ITERATIONS {
                        if let Some(token) = gate.enter() {
                            let seen = gate.in_flight();
                            observed_max.fetch_max(seen, Ordering::AcqRel);
                            assert!(seen <= MAX, "in_flight {seen} exceeded cap {MAX}");
                            drop(token);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(observed_max.load(Ordering::Acquire) <= MAX);
        assert_eq!(gate.in_flight(), 0);
    }
}
