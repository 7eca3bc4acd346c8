// LogPulse - app/flight.rs
//
// Single-flight control over scan passes, plus the byte progress counters
// that observers poll while a pass runs.
//
// `try_acquire` hands out at most one `FlightGuard` at a time. The guard is
// `Send`, so a reparse can move it into its background thread; the flag is
// released and progress finalised when the guard is dropped, on whichever
// thread that happens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct FlightState {
    active: Mutex<bool>,
    scanned_bytes: AtomicU64,
    total_bytes: AtomicU64,
}

/// Point-in-time view of scan progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// Bytes consumed so far in the current (or last) pass, capped at
    /// `total_bytes`.
    pub scanned_bytes: u64,
    /// Bytes the current (or last) pass expected to read.
    pub total_bytes: u64,
    /// Whether a pass holds the lock right now.
    pub active: bool,
}

impl ProgressSnapshot {
    /// Completed fraction in `0.0..=1.0`; `1.0` when nothing was scannable.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.scanned_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Process-wide scan lock. Cheap to clone; clones share the same lock.
#[derive(Debug, Clone, Default)]
pub struct ScanFlight {
    state: Arc<FlightState>,
}

impl ScanFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if free, resetting progress. `None` if a pass is
    /// already running.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        let mut active = self.lock_active();
        if *active {
            return None;
        }
        *active = true;
        self.state.scanned_bytes.store(0, Ordering::Relaxed);
        self.state.total_bytes.store(0, Ordering::Relaxed);
        Some(FlightGuard {
            state: Arc::clone(&self.state),
        })
    }

    pub fn is_active(&self) -> bool {
        *self.lock_active()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        let total = self.state.total_bytes.load(Ordering::Relaxed);
        let scanned = self.state.scanned_bytes.load(Ordering::Relaxed);
        ProgressSnapshot {
            scanned_bytes: scanned.min(total),
            total_bytes: total,
            active: self.is_active(),
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, bool> {
        self.state.active.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Proof of holding the scan lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct FlightGuard {
    state: Arc<FlightState>,
}

impl FlightGuard {
    pub fn set_total(&self, bytes: u64) {
        self.state.total_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn add_scanned(&self, bytes: u64) {
        self.state.scanned_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let total = self.state.total_bytes.load(Ordering::Relaxed);
        self.state.scanned_bytes.store(total, Ordering::Relaxed);
        let mut active = self.state.active.lock().unwrap_or_else(|p| p.into_inner());
        *active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_one_guard_at_a_time() {
        let flight = ScanFlight::new();
        let guard = flight.try_acquire().expect("first acquire succeeds");
        assert!(flight.is_active());
        assert!(flight.try_acquire().is_none());
        drop(guard);
        assert!(!flight.is_active());
        assert!(flight.try_acquire().is_some());
    }

    #[test]
    fn test_progress_lifecycle() {
        let flight = ScanFlight::new();
        let guard = flight.try_acquire().unwrap();
        guard.set_total(1000);
        guard.add_scanned(250);
        let p = flight.progress();
        assert_eq!((p.scanned_bytes, p.total_bytes, p.active), (250, 1000, true));
        assert!((p.fraction() - 0.25).abs() < f64::EPSILON);

        drop(guard);
        let p = flight.progress();
        assert_eq!((p.scanned_bytes, p.total_bytes, p.active), (1000, 1000, false));
    }

    #[test]
    fn test_guard_released_on_other_thread() {
        let flight = ScanFlight::new();
        let guard = flight.try_acquire().unwrap();
        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert!(!flight.is_active());
    }
}
