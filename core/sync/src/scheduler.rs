//! Periodic and on-demand driving of sync passes.
//!
//! The scheduler is split into a cheaply cloneable command handle and a
//! task that owns the loop. The task serializes passes: a scheduled tick
//! and an explicit request never run concurrently against the same
//! account.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{error, info};

use ledgerbridge_common::{Error, Result};

const COMMAND_BUFFER: usize = 16;

/// When sync passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Only when requested.
    Manual,
    /// On a fixed interval, plus on request.
    Periodic { interval: Duration },
}

/// Counters one pass reports back.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncSummary {
    pub pulled: u64,
    pub pushed: u64,
    pub conflicts: u64,
    pub failed: u64,
}

enum Command {
    Sync(oneshot::Sender<Result<SyncSummary>>),
    Shutdown,
}

/// Handle for requesting passes from the running task.
#[derive(Clone)]
pub struct SyncScheduler {
    command_tx: mpsc::Sender<Command>,
}

/// Loop half of the scheduler; drive it with [`SchedulerTask::run`].
pub struct SchedulerTask {
    mode: ScheduleMode,
    command_rx: mpsc::Receiver<Command>,
}

impl SyncScheduler {
    pub fn new(mode: ScheduleMode) -> (Self, SchedulerTask) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        (Self { command_tx }, SchedulerTask { mode, command_rx })
    }

    /// Run one pass now and wait for its summary.
    pub async fn request_sync(&self) -> Result<SyncSummary> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Sync(reply_tx))
            .await
            .map_err(|_| Error::InvalidInput("Scheduler is not running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::InvalidInput("Scheduler dropped the request".to_string()))?
    }

    /// Stop the task after any pass in flight.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}

impl SchedulerTask {
    /// Run scheduled and requested passes until shutdown.
    ///
    /// `sync_fn` performs one full pass. Missed ticks are skipped rather
    /// than bursted: after a pass outlasts the interval, the next tick
    /// waits a whole period.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<SyncSummary>>,
    {
        let mut ticker = match self.mode {
            ScheduleMode::Manual => None,
            ScheduleMode::Periodic { interval: every } => {
                let mut ticker = interval(every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick fires immediately; consume it so the first
                // scheduled pass lands one period out.
                ticker.tick().await;
                Some(ticker)
            }
        };

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(Command::Sync(reply)) => {
                        let result = sync_fn().await;
                        // The requester may have gone away meanwhile.
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) | None => {
                        info!("Sync scheduler stopping");
                        break;
                    }
                },
                _ = next_tick(&mut ticker) => {
                    match sync_fn().await {
                        Ok(summary) => info!(
                            pulled = summary.pulled,
                            pushed = summary.pushed,
                            conflicts = summary.conflicts,
                            failed = summary.failed,
                            "Scheduled sync pass finished"
                        ),
                        Err(e) => error!(error = %e, "Scheduled sync pass failed"),
                    }
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counting_sync(
        count: Arc<AtomicU32>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<SyncSummary>> + Send>> {
        move || {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(SyncSummary {
                    pulled: 1,
                    ..SyncSummary::default()
                })
            })
        }
    }

    #[tokio::test]
    async fn test_manual_mode_runs_only_on_request() {
        let (scheduler, task) = SyncScheduler::new(ScheduleMode::Manual);
        let count = Arc::new(AtomicU32::new(0));
        let handle = tokio::spawn(task.run(counting_sync(count.clone())));

        let summary = scheduler.request_sync().await.unwrap();
        assert_eq!(summary.pulled, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.shutdown().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_periodic_mode_keeps_ticking() {
        let (scheduler, task) = SyncScheduler::new(ScheduleMode::Periodic {
            interval: Duration::from_millis(20),
        });
        let count = Arc::new(AtomicU32::new(0));
        let handle = tokio::spawn(task.run(counting_sync(count.clone())));

        tokio::time::sleep(Duration::from_millis(110)).await;
        scheduler.shutdown().await;
        handle.await.unwrap();

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_request_after_task_stopped_errors() {
        let (scheduler, task) = SyncScheduler::new(ScheduleMode::Manual);
        drop(task);

        let result = scheduler.request_sync().await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
