/// Single-flight guard: at most one optimize call in flight per surface.
///
/// Each surface instance owns its own guard; guards are never shared across
/// surfaces. A second caller is turned away immediately rather than queued.
///
/// Two ways to use it:
///
/// - [`SingleFlight::try_acquire`] / [`SingleFlight::release`] for callers
///   that manage the busy flag by hand.
/// - [`SingleFlight::enter`], which returns a [`FlightPermit`] that releases
///   the guard when dropped, including on early return and unwinding.
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the guard busy. Returns `false` without waiting if it already is.
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Re-arm the guard. Safe to call when it is not held.
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Acquire the guard for the lifetime of the returned permit.
    pub fn enter(&self) -> Option<FlightPermit<'_>> {
        self.try_acquire().then_some(FlightPermit { guard: self })
    }
}

/// Proof that the holder owns the in-flight slot. Releases on drop.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct FlightPermit<'a> {
    guard: &'a SingleFlight,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let guard = SingleFlight::new();
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());
        assert!(guard.is_busy());

        guard.release();
        assert!(!guard.is_busy());
        assert!(guard.try_acquire());
    }

    #[test]
    fn permit_releases_on_drop() {
        let guard = SingleFlight::new();
        {
            let _permit = guard.enter().unwrap();
            assert!(guard.enter().is_none());
        }
        assert!(guard.enter().is_some());
    }

    #[test]
    fn permit_releases_when_holder_panics() {
        let guard = Arc::new(SingleFlight::new());
        let held = Arc::clone(&guard);
        let outcome = thread::spawn(move || {
            let _permit = held.enter().unwrap();
            panic!("handler failed");
        })
        .join();
        assert!(outcome.is_err());
        assert!(!guard.is_busy());
    }

    #[test]
    fn racing_threads_admit_exactly_one() {
        let guard = Arc::new(SingleFlight::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    guard.try_acquire()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(admitted, 1);
    }
}
