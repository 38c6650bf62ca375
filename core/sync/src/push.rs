//! Local-to-remote push.
//!
//! Every row queued as pending_push is sent through the record API, one
//! create or update per record. Failures are classified: retryable ones
//! keep the row queued with a bumped retry count until the budget runs
//! out, permanent ones park the row in the error state immediately.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};

use ledgerbridge_common::{Error, Result};
use ledgerbridge_netsuite::{generate_idempotency_key, ResourceClient};

use crate::mapper::EntityMapper;
use crate::metadata::{SyncMetadata, SyncStatus};
use crate::pull::RecordError;
use crate::store::{LocalRecordStore, MetadataStore};

/// Push attempts allowed per record before it parks in the error state.
pub const PUSH_MAX_RETRIES: u32 = 3;

/// Outcome counters for one push.
#[derive(Debug, Clone, Default)]
pub struct PushReport {
    /// Records confirmed by the remote side.
    pub pushed: u64,
    /// Records that failed this batch, whether or not they will retry.
    pub failed: u64,
    /// What went wrong, per record.
    pub errors: Vec<RecordError>,
}

/// Push every pending local change for one entity.
///
/// A failed record never aborts the batch. Records created remotely get
/// their new id linked back into the metadata row.
pub async fn push_pending(
    resources: &ResourceClient,
    mapper: &dyn EntityMapper,
    metadata: &dyn MetadataStore,
    local: &dyn LocalRecordStore,
    max_retries: u32,
) -> Result<PushReport> {
    let pending = metadata
        .find_by_status(mapper.local_table(), SyncStatus::PendingPush)
        .await?;

    let mut report = PushReport::default();
    for mut meta in pending {
        match push_record(resources, mapper, local, &mut meta).await {
            Ok(()) => {
                meta.mark_synced(None);
                report.pushed += 1;
            }
            Err(e) => {
                error!(
                    entity = mapper.remote_type(),
                    local_id = %meta.local_record_id,
                    retry_count = meta.retry_count,
                    error = %e,
                    "Push failed for record"
                );
                report.failed += 1;
                report.errors.push(RecordError {
                    record_id: meta.local_record_id.clone(),
                    message: e.to_string(),
                });
                if e.retryable() && meta.should_retry(max_retries) {
                    meta.record_push_failure(e.to_string());
                } else {
                    meta.mark_error(e.to_string());
                }
            }
        }
        metadata.upsert(&meta).await?;
    }

    info!(
        entity = mapper.remote_type(),
        pushed = report.pushed,
        failed = report.failed,
        "Push finished"
    );
    Ok(report)
}

/// Send one record; links the remote id back on a successful create.
async fn push_record(
    resources: &ResourceClient,
    mapper: &dyn EntityMapper,
    local: &dyn LocalRecordStore,
    meta: &mut SyncMetadata,
) -> Result<()> {
    let record = load_local(local, meta).await?;
    let body = mapper.to_remote(&record)?;

    match meta.remote_id.clone() {
        Some(remote_id) => {
            resources
                .update(mapper.remote_type(), &remote_id, &body)
                .await?;
            debug!(
                entity = mapper.remote_type(),
                remote_id = %remote_id,
                "Updated remote record"
            );
        }
        None => {
            // The hour-bucketed key makes a retried create a no-op upstream
            // instead of a duplicate record.
            let key = generate_idempotency_key(
                "create",
                mapper.remote_type(),
                &meta.local_record_id,
                Utc::now().timestamp_millis(),
            );
            let id = resources
                .create(mapper.remote_type(), &body, Some(&key))
                .await?;
            meta.remote_id = Some(id);
        }
    }
    Ok(())
}

async fn load_local(local: &dyn LocalRecordStore, meta: &SyncMetadata) -> Result<Value> {
    local
        .get(&meta.local_table, &meta.local_record_id)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Local record {}/{} is gone",
                meta.local_table, meta.local_record_id
            ))
        })
}
