//! Run history for sync passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which half of a sync pass a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Pull,
    Push,
}

/// How a run selected its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Everything, no watermark.
    Full,
    /// Only records modified since the watermark.
    Delta,
    /// Locally pending records.
    Push,
}

/// Run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One pull or push run, bracketed running -> completed/failed.
///
/// The most recent completed pull's `completed_at` is the next pull's
/// delta watermark for that entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunLog {
    pub id: String,
    pub sync_type: SyncType,
    pub entity_type: String,
    pub direction: SyncDirection,
    pub status: RunStatus,
    pub records_processed: u64,
    pub records_failed: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
}

impl SyncRunLog {
    /// Open a run in the `running` state.
    pub fn start(
        sync_type: SyncType,
        entity_type: impl Into<String>,
        direction: SyncDirection,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sync_type,
            entity_type: entity_type.into(),
            direction,
            status: RunStatus::Running,
            records_processed: 0,
            records_failed: 0,
            started_at: Utc::now(),
            completed_at: None,
            error_summary: None,
        }
    }

    /// Close the run successfully.
    pub fn complete(&mut self, processed: u64, failed: u64) {
        self.status = RunStatus::Completed;
        self.records_processed = processed;
        self.records_failed = failed;
        self.completed_at = Some(Utc::now());
    }

    /// Close the run as failed, keeping a human-readable summary.
    pub fn fail(&mut self, processed: u64, failed: u64, summary: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.records_processed = processed;
        self.records_failed = failed;
        self.completed_at = Some(Utc::now());
        self.error_summary = Some(summary.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_opens_running_run() {
        let run = SyncRunLog::start(SyncType::Delta, "customer", SyncDirection::Pull);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());
        assert_eq!(run.records_processed, 0);
    }

    #[test]
    fn test_complete_stamps_counts_and_time() {
        let mut run = SyncRunLog::start(SyncType::Push, "invoice", SyncDirection::Push);
        run.complete(12, 2);

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.records_processed, 12);
        assert_eq!(run.records_failed, 2);
        assert!(run.completed_at.is_some());
        assert!(run.error_summary.is_none());
    }

    #[test]
    fn test_fail_keeps_summary() {
        let mut run = SyncRunLog::start(SyncType::Full, "vendor", SyncDirection::Pull);
        run.fail(0, 0, "upstream returned 500");

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_summary.as_deref(), Some("upstream returned 500"));
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_serializes_snake_case() {
        let run = SyncRunLog::start(SyncType::Delta, "customer", SyncDirection::Pull);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["sync_type"], "delta");
        assert_eq!(json["direction"], "pull");
        assert_eq!(json["status"], "running");
    }
}
