//! Per-record sync bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of one synchronized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local and remote agree as of the last sync.
    Synced,
    /// The local copy changed and has not been pushed yet.
    PendingPush,
    /// Both sides changed; waiting for manual resolution.
    Conflict,
    /// The last push attempt failed permanently.
    Error,
}

/// Both sides of a flagged conflict, captured at flag time.
///
/// `remote` holds the pulled record already translated to the local shape,
/// so a manual use_remote resolution can apply it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictPayload {
    pub local: Option<Value>,
    pub remote: Value,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}

/// Bookkeeping row linking one local record to its remote counterpart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub id: String,
    pub local_table: String,
    pub local_record_id: String,
    pub remote_record_type: String,
    /// None until the first push creates the record remotely.
    pub remote_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_modified_remote: Option<DateTime<Utc>>,
    pub last_modified_local: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub conflict_payload: Option<ConflictPayload>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl SyncMetadata {
    /// Row for a record that first appeared locally and must be pushed.
    pub fn new_pending(
        local_table: impl Into<String>,
        local_record_id: impl Into<String>,
        remote_record_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            local_table: local_table.into(),
            local_record_id: local_record_id.into(),
            remote_record_type: remote_record_type.into(),
            remote_id: None,
            last_synced_at: None,
            last_modified_remote: None,
            last_modified_local: Some(Utc::now()),
            sync_status: SyncStatus::PendingPush,
            conflict_payload: None,
            error_message: None,
            retry_count: 0,
        }
    }

    /// Row for a record that first appeared remotely and was just pulled.
    pub fn new_synced(
        local_table: impl Into<String>,
        local_record_id: impl Into<String>,
        remote_record_type: impl Into<String>,
        remote_id: impl Into<String>,
        remote_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            local_table: local_table.into(),
            local_record_id: local_record_id.into(),
            remote_record_type: remote_record_type.into(),
            remote_id: Some(remote_id.into()),
            last_synced_at: Some(Utc::now()),
            last_modified_remote: remote_modified,
            last_modified_local: None,
            sync_status: SyncStatus::Synced,
            conflict_payload: None,
            error_message: None,
            retry_count: 0,
        }
    }

    /// Mark in step with remote, clearing conflict and error bookkeeping.
    pub fn mark_synced(&mut self, remote_modified: Option<DateTime<Utc>>) {
        self.sync_status = SyncStatus::Synced;
        self.last_synced_at = Some(Utc::now());
        if let Some(ts) = remote_modified {
            self.last_modified_remote = Some(ts);
        }
        self.conflict_payload = None;
        self.error_message = None;
        self.retry_count = 0;
    }

    /// Mark locally modified and queue for the next push.
    pub fn mark_pending_push(&mut self) {
        self.sync_status = SyncStatus::PendingPush;
        self.last_modified_local = Some(Utc::now());
        self.conflict_payload = None;
    }

    /// Flag for manual resolution, keeping both sides.
    pub fn mark_conflicted(&mut self, payload: ConflictPayload) {
        self.sync_status = SyncStatus::Conflict;
        self.conflict_payload = Some(payload);
    }

    /// Mark permanently failed; stays out of push batches until requeued.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.sync_status = SyncStatus::Error;
        self.error_message = Some(message.into());
    }

    /// Record one failed push attempt without giving up on the row.
    pub fn record_push_failure(&mut self, message: impl Into<String>) {
        self.retry_count += 1;
        self.error_message = Some(message.into());
    }

    /// Whether another push attempt is allowed.
    pub fn should_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }
}
