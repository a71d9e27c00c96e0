//! Elapsed-time measurement for time-budget decisions
//!
//! The engine consults a single [`ExecutionClock`] for every budget check
//! instead of reading the wall clock ad hoc, so tests can inject a
//! [`ManualClock`] and deterministically drive the timeout exit paths.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Current instant according to this clock
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`Clock`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven [`Clock`] for tests
///
/// Starts at the construction instant and only moves when [`advance`]
/// is called.
///
/// [`advance`]: ManualClock::advance
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward by `delta`
    pub fn advance(&self, delta: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += delta;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now
            .lock()
            .map(|now| *now)
            // A poisoned lock only happens if a test panicked mid-advance;
            // fall back to the real clock rather than propagate the panic.
            .unwrap_or_else(|_| Instant::now())
    }
}

/// Tracks elapsed wall time for one batch run
///
/// Pure measurement from a recorded start instant; no side effects. One
/// logical run owns one clock instance.
pub struct ExecutionClock {
    clock: Arc<dyn Clock>,
    started_at: Instant,
}

impl ExecutionClock {
    /// Record the start instant of a run
    pub fn start(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self { clock, started_at }
    }

    /// Wall time elapsed since [`start`](ExecutionClock::start)
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    /// Whether elapsed time has crossed `limit`
    pub fn is_over_budget(&self, limit: Duration) -> bool {
        self.elapsed() > limit
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_elapsed_is_monotonic() {
        let clock = ExecutionClock::start(Arc::new(SystemClock));
        let first = clock.elapsed();
        let second = clock.elapsed();
        assert!(second >= first);
    }

    #[test]
    fn manual_clock_starts_with_zero_elapsed() {
        let manual = Arc::new(ManualClock::new());
        let clock = ExecutionClock::start(manual);
        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert!(!clock.is_over_budget(Duration::ZERO));
    }

    #[test]
    fn manual_clock_advance_crosses_budget() {
        let manual = Arc::new(ManualClock::new());
        let clock = ExecutionClock::start(Arc::clone(&manual) as Arc<dyn Clock>);

        manual.advance(Duration::from_secs(100));
        assert_eq!(clock.elapsed(), Duration::from_secs(100));
        assert!(clock.is_over_budget(Duration::from_secs(99)));
        assert!(!clock.is_over_budget(Duration::from_secs(100)));
        assert!(!clock.is_over_budget(Duration::from_secs(101)));
    }
}
