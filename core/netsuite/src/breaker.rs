//! Fail-fast guard after repeated upstream failures.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

/// Consecutive surfaced failures before the circuit opens.
pub const FAILURE_THRESHOLD: u32 = 5;

/// How long an open circuit rejects calls.
pub const OPEN_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Counts consecutive surfaced failures across all calls through one
/// transport; past the threshold, every call fails fast until the window
/// elapses. A failure during the probe that follows reopens the window.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    open_for: Duration,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_policy(FAILURE_THRESHOLD, OPEN_DURATION)
    }

    pub fn with_policy(threshold: u32, open_for: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                open_until: None,
            }),
            threshold: threshold.max(1),
            open_for,
        }
    }

    /// Time left in the open window, or `None` when calls may proceed. An
    /// elapsed window closes here, letting the next call probe upstream.
    pub fn open_remaining(&self) -> Option<Duration> {
        let mut state = self.lock_state();
        let until = state.open_until?;
        let now = Instant::now();
        if now < until {
            Some(until - now)
        } else {
            state.open_until = None;
            None
        }
    }

    pub fn record_success(&self) {
        let mut state = self.lock_state();
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.lock_state();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold && state.open_until.is_none() {
            warn!(
                failures = state.consecutive_failures,
                open_secs = self.open_for.as_secs(),
                "Opening circuit after consecutive upstream failures"
            );
            state.open_until = Some(Instant::now() + self.open_for);
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock_state().consecutive_failures
    }

    fn lock_state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
