//! Priority-aware bound on in-flight upstream requests.
//!
//! NetSuite enforces one concurrency budget per account, shared across
//! every integration that touches it, so the limiter defaults conservative
//! and adapts: rate-limit signals shrink the bound multiplicatively, and
//! sustained success grows it back one slot at a time.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Multiplier applied to the concurrency bound on a rate-limit signal.
const REDUCTION_FACTOR: f64 = 0.7;

/// Point-in-time limiter counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStats {
    pub running: usize,
    pub max_allowed: usize,
    pub queued: usize,
}

struct Waiter {
    priority: u8,
    seq: u64,
    tx: oneshot::Sender<Permit>,
}

// Max-heap order: higher priority first, earlier arrival first within a
// priority.
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

struct State {
    running: usize,
    max_concurrent: usize,
    next_seq: u64,
    waiters: BinaryHeap<Waiter>,
}

struct Shared {
    state: Mutex<State>,
    /// Construction-time limit; the ceiling restores grow back toward.
    original_limit: usize,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give a finished request's slot back: shed it while over-limit,
    /// otherwise hand it to the best waiter, otherwise free it.
    fn release(shared: &Arc<Shared>) {
        loop {
            let waiter = {
                let mut state = shared.lock_state();
                if state.running > state.max_concurrent {
                    state.running -= 1;
                    return;
                }
                match state.waiters.pop() {
                    Some(waiter) => waiter,
                    None => {
                        state.running = state.running.saturating_sub(1);
                        return;
                    }
                }
            };
            let permit = Permit::new(shared.clone());
            match waiter.tx.send(permit) {
                Ok(()) => return,
                Err(mut unclaimed) => {
                    // Waiter gave up; keep the slot and offer it to the next.
                    unclaimed.armed = false;
                }
            }
        }
    }

    /// Admit queued waiters while capacity is available.
    fn admit_waiters(shared: &Arc<Shared>) {
        loop {
            let waiter = {
                let mut state = shared.lock_state();
                if state.running >= state.max_concurrent {
                    return;
                }
                match state.waiters.pop() {
                    Some(waiter) => {
                        state.running += 1;
                        waiter
                    }
                    None => return,
                }
            };
            let permit = Permit::new(shared.clone());
            // A refused send drops the permit, which releases the slot just
            // counted.
            let _ = waiter.tx.send(permit);
        }
    }
}

/// Admission token for one in-flight request. Dropping it releases the
/// slot to the highest-priority waiter.
pub struct Permit {
    shared: Arc<Shared>,
    armed: bool,
}

impl Permit {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            Shared::release(&self.shared);
        }
    }
}

/// Counting semaphore with priority admission and an adaptive bound.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    shared: Arc<Shared>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    running: 0,
                    max_concurrent,
                    next_seq: 0,
                    waiters: BinaryHeap::new(),
                }),
                original_limit: max_concurrent,
            }),
        }
    }

    /// Wait for a slot. Higher `priority` is admitted first; equal
    /// priorities are admitted in arrival order.
    pub async fn acquire(&self, priority: u8) -> Permit {
        loop {
            let rx = {
                let mut state = self.shared.lock_state();
                if state.running < state.max_concurrent && state.waiters.is_empty() {
                    state.running += 1;
                    return Permit::new(self.shared.clone());
                }
                let (tx, rx) = oneshot::channel();
                let seq = state.next_seq;
                state.next_seq += 1;
                state.waiters.push(Waiter { priority, seq, tx });
                rx
            };
            if let Ok(permit) = rx.await {
                return permit;
            }
            // Sender dropped without a grant; queue again.
        }
    }

    /// Acquire a slot, run `work`, release on completion.
    pub async fn run<F, T>(&self, priority: u8, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire(priority).await;
        work.await
    }

    /// Shrink the bound to 70% (floor 1) after an upstream rate limit.
    pub fn reduce_concurrency(&self) {
        let mut state = self.shared.lock_state();
        let reduced = ((state.max_concurrent as f64) * REDUCTION_FACTOR).floor() as usize;
        let reduced = reduced.max(1);
        if reduced < state.max_concurrent {
            warn!(
                from = state.max_concurrent,
                to = reduced,
                "Upstream rate limit hit, reducing concurrency"
            );
            state.max_concurrent = reduced;
        }
    }

    /// Grow the bound by one toward its construction-time ceiling.
    pub fn restore_concurrency(&self) {
        {
            let mut state = self.shared.lock_state();
            if state.max_concurrent >= self.shared.original_limit {
                return;
            }
            state.max_concurrent += 1;
            debug!(to = state.max_concurrent, "Restoring concurrency");
        }
        Shared::admit_waiters(&self.shared);
    }

    pub fn stats(&self) -> LimiterStats {
        let state = self.shared.lock_state();
        LimiterStats {
            running: state.running,
            max_allowed: state.max_concurrent,
            queued: state.waiters.len(),
        }
    }
}
