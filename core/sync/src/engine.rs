//! Orchestration of pull, push, and conflict resolution per entity.
//!
//! Every run is bracketed in the run log: inserted as `running`, closed as
//! `completed` or `failed`. The most recent completed pull's close time is
//! the delta watermark for the next pull of that entity, so a failed run
//! never advances the watermark and its window is retried.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ledgerbridge_common::{Error, Result};
use ledgerbridge_netsuite::{NetSuiteClient, Priority, QueryClient, ResourceClient};

use crate::conflict::ConflictStrategy;
use crate::mapper::EntityMapper;
use crate::metadata::{SyncMetadata, SyncStatus};
use crate::pull::{pull_delta, PullReport};
use crate::push::{push_pending, PushReport, PUSH_MAX_RETRIES};
use crate::runlog::{SyncDirection, SyncRunLog, SyncType};
use crate::store::{LocalRecordStore, MetadataStore, RunLogStore};

/// Tunables for sync passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    #[serde(default = "default_push_max_retries")]
    pub push_max_retries: u32,
}

fn default_push_max_retries() -> u32 {
    PUSH_MAX_RETRIES
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::default(),
            push_max_retries: PUSH_MAX_RETRIES,
        }
    }
}

/// Side a manual resolution keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    UseLocal,
    UseRemote,
}

/// Both halves of a full sync pass.
#[derive(Debug, Clone)]
pub struct FullSyncReport {
    pub pull: PullReport,
    pub push: PushReport,
}

/// Coordinates pulls and pushes for one account.
///
/// Pushes ride the high-priority lane since they carry user-visible local
/// edits; bulk pulls yield to them under contention.
pub struct SyncEngine {
    resources: ResourceClient,
    query: QueryClient,
    metadata: Arc<dyn MetadataStore>,
    runs: Arc<dyn RunLogStore>,
    local: Arc<dyn LocalRecordStore>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        client: &NetSuiteClient,
        metadata: Arc<dyn MetadataStore>,
        runs: Arc<dyn RunLogStore>,
        local: Arc<dyn LocalRecordStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            resources: client.resources().clone().with_priority(Priority::High),
            query: client.query().clone().with_priority(Priority::Normal),
            metadata,
            runs,
            local,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Pull remote changes for one entity.
    ///
    /// Delta when a completed pull exists to watermark from, full otherwise.
    pub async fn pull(&self, mapper: &dyn EntityMapper) -> Result<PullReport> {
        let watermark = self
            .runs
            .last_completed(mapper.remote_type(), SyncDirection::Pull)
            .await?
            .and_then(|run| run.completed_at);
        let sync_type = if watermark.is_some() {
            SyncType::Delta
        } else {
            SyncType::Full
        };
        debug!(
            entity = mapper.remote_type(),
            watermark = ?watermark,
            "Starting pull run"
        );

        let mut run = SyncRunLog::start(sync_type, mapper.remote_type(), SyncDirection::Pull);
        self.runs.insert(&run).await?;

        match pull_delta(
            &self.query,
            mapper,
            self.metadata.as_ref(),
            self.local.as_ref(),
            watermark,
            self.config.conflict_strategy,
        )
        .await
        {
            Ok(report) => {
                run.complete(report.pulled, report.errors.len() as u64);
                self.runs.update(&run).await?;
                Ok(report)
            }
            Err(e) => {
                run.fail(0, 0, e.to_string());
                self.runs.update(&run).await?;
                Err(e)
            }
        }
    }

    /// Push pending local changes for one entity.
    pub async fn push(&self, mapper: &dyn EntityMapper) -> Result<PushReport> {
        let mut run = SyncRunLog::start(SyncType::Push, mapper.remote_type(), SyncDirection::Push);
        self.runs.insert(&run).await?;

        match push_pending(
            &self.resources,
            mapper,
            self.metadata.as_ref(),
            self.local.as_ref(),
            self.config.push_max_retries,
        )
        .await
        {
            Ok(report) => {
                run.complete(report.pushed + report.failed, report.failed);
                self.runs.update(&run).await?;
                Ok(report)
            }
            Err(e) => {
                run.fail(0, 0, e.to_string());
                self.runs.update(&run).await?;
                Err(e)
            }
        }
    }

    /// Pull then push one entity; a failed pull skips the push so stale
    /// local state is never written over fresher remote data.
    pub async fn full_sync(&self, mapper: &dyn EntityMapper) -> Result<FullSyncReport> {
        let pull = self.pull(mapper).await?;
        let push = self.push(mapper).await?;
        Ok(FullSyncReport { pull, push })
    }

    /// Most recent runs across all entities.
    pub async fn sync_history(&self, limit: usize) -> Result<Vec<SyncRunLog>> {
        self.runs.recent(limit).await
    }

    /// Every record currently waiting on manual resolution.
    pub async fn conflicts(&self) -> Result<Vec<SyncMetadata>> {
        self.metadata.all_with_status(SyncStatus::Conflict).await
    }

    /// Resolve one flagged conflict.
    ///
    /// `use_local` requeues the local copy for the next push; `use_remote`
    /// applies the remote side captured in the conflict payload.
    pub async fn resolve_conflict(
        &self,
        metadata_id: &str,
        choice: ConflictChoice,
    ) -> Result<SyncMetadata> {
        let mut meta = self
            .metadata
            .get(metadata_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No sync metadata with id '{}'", metadata_id)))?;
        if meta.sync_status != SyncStatus::Conflict {
            return Err(Error::InvalidInput(format!(
                "Record '{}' is not in conflict",
                metadata_id
            )));
        }

        match choice {
            ConflictChoice::UseLocal => {
                meta.mark_pending_push();
            }
            ConflictChoice::UseRemote => {
                let payload = meta.conflict_payload.clone().ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Conflict '{}' carries no stored payload",
                        metadata_id
                    ))
                })?;
                self.local
                    .upsert(&meta.local_table, Some(&meta.local_record_id), &payload.remote)
                    .await?;
                meta.mark_synced(None);
            }
        }
        self.metadata.upsert(&meta).await?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use ledgerbridge_common::AccountId;
    use ledgerbridge_netsuite::{MemorySecretStore, NetSuiteConfig, TokenSet};

    use super::*;
    use crate::mappers::CustomerMapper;
    use crate::memory::{MemoryLocalStore, MemoryMetadataStore, MemoryRunLogStore};
    use crate::metadata::ConflictPayload;
    use crate::runlog::RunStatus;

    struct Harness {
        engine: SyncEngine,
        metadata: Arc<MemoryMetadataStore>,
        local: Arc<MemoryLocalStore>,
    }

    async fn harness(server: &MockServer, config: SyncConfig) -> Harness {
        let ns_config = NetSuiteConfig::new(
            AccountId::new("1234567").unwrap(),
            "client-id",
            "client-secret",
            "https://localhost/callback",
            "seal-key",
        )
        .unwrap()
        .with_rest_base(server.uri());

        let client = NetSuiteClient::new(ns_config, Arc::new(MemorySecretStore::new())).unwrap();
        client
            .tokens()
            .store_tokens(TokenSet {
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                expires_in: 3600,
                token_type: "Bearer".to_string(),
                issued_at: Utc::now(),
            })
            .await
            .unwrap();

        let metadata = Arc::new(MemoryMetadataStore::new());
        let local = Arc::new(MemoryLocalStore::new());
        let runs = Arc::new(MemoryRunLogStore::new());
        let engine = SyncEngine::new(&client, metadata.clone(), runs, local.clone(), config);
        Harness {
            engine,
            metadata,
            local,
        }
    }

    fn seed_conflict() -> (SyncMetadata, ConflictPayload) {
        let mut meta = SyncMetadata::new_synced("customers", "local-1", "customer", "101", None);
        let payload = ConflictPayload {
            local: Some(json!({"name": "Local Edit"})),
            remote: json!({"name": "Remote Edit", "status": "active"}),
            reason: "manual review required".to_string(),
            flagged_at: Utc::now(),
        };
        meta.mark_conflicted(payload.clone());
        (meta, payload)
    }

    #[tokio::test]
    async fn test_pull_edit_push_round_trip_then_delta() {
        let server = MockServer::start().await;
        let h = harness(&server, SyncConfig::default()).await;

        // The first pull has no watermark and queries everything; later
        // queries fall through to the catch-all empty page.
        let full_sql = CustomerMapper.build_select_query(None, None, None);
        Mock::given(method("POST"))
            .and(path("/services/rest/query/v1/suiteql"))
            .and(body_json(json!({ "q": full_sql })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "101",
                    "entityid": "CUST-101",
                    "companyname": "Acme Inc",
                    "isinactive": "F",
                    "lastmodifieddate": "2024-05-01 10:00:00",
                }],
                "hasMore": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/services/rest/query/v1/suiteql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [],
                "hasMore": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/services/rest/record/v1/customer/101"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let pulled = h.engine.pull(&CustomerMapper).await.unwrap();
        assert_eq!(pulled.created, 1);

        // A local edit queues the record for push.
        let mut meta = h
            .metadata
            .find_by_remote("customers", "101")
            .await
            .unwrap()
            .unwrap();
        h.local
            .upsert(
                "customers",
                Some(&meta.local_record_id),
                &json!({"name": "Edited Locally"}),
            )
            .await
            .unwrap();
        meta.mark_pending_push();
        h.metadata.upsert(&meta).await.unwrap();

        let pushed = h.engine.push(&CustomerMapper).await.unwrap();
        assert_eq!(pushed.pushed, 1);
        let meta = h.metadata.get(&meta.id).await.unwrap().unwrap();
        assert_eq!(meta.sync_status, SyncStatus::Synced);

        // The second pull watermarks from the first completed pull.
        let pulled = h.engine.pull(&CustomerMapper).await.unwrap();
        assert_eq!(pulled.pulled, 0);

        let history = h.engine.sync_history(10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].sync_type, SyncType::Delta);
        assert_eq!(history[0].status, RunStatus::Completed);
        assert_eq!(history[2].sync_type, SyncType::Full);
    }

    #[tokio::test]
    async fn test_full_sync_pulls_before_pushing() {
        let server = MockServer::start().await;
        let h = harness(&server, SyncConfig::default()).await;

        Mock::given(method("POST"))
            .and(path("/services/rest/query/v1/suiteql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [],
                "hasMore": false
            })))
            .mount(&server)
            .await;

        let report = h.engine.full_sync(&CustomerMapper).await.unwrap();
        assert_eq!(report.pull.pulled, 0);
        assert_eq!(report.push.pushed, 0);

        let history = h.engine.sync_history(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].direction, SyncDirection::Push);
        assert_eq!(history[1].direction, SyncDirection::Pull);
    }

    #[tokio::test]
    async fn test_pull_failure_marks_run_failed_and_keeps_watermark() {
        let server = MockServer::start().await;
        let h = harness(&server, SyncConfig::default()).await;

        Mock::given(method("POST"))
            .and(path("/services/rest/query/v1/suiteql"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "title": "Invalid search query"
            })))
            .mount(&server)
            .await;

        let result = h.engine.pull(&CustomerMapper).await;
        assert!(result.is_err());

        let history = h.engine.sync_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RunStatus::Failed);
        assert!(history[0].error_summary.is_some());
        // A failed run never watermarks, so the next pull is full again.
        assert_eq!(history[0].sync_type, SyncType::Full);
    }

    #[tokio::test]
    async fn test_resolve_conflict_use_local_requeues_for_push() {
        let server = MockServer::start().await;
        let h = harness(&server, SyncConfig::default()).await;

        let (meta, _) = seed_conflict();
        h.metadata.upsert(&meta).await.unwrap();
        h.local
            .upsert("customers", Some("local-1"), &json!({"name": "Local Edit"}))
            .await
            .unwrap();

        let conflicts = h.engine.conflicts().await.unwrap();
        assert_eq!(conflicts.len(), 1);

        let resolved = h
            .engine
            .resolve_conflict(&meta.id, ConflictChoice::UseLocal)
            .await
            .unwrap();
        assert_eq!(resolved.sync_status, SyncStatus::PendingPush);
        assert!(resolved.conflict_payload.is_none());

        // The local table keeps the local copy untouched.
        let record = h.local.get("customers", "local-1").await.unwrap().unwrap();
        assert_eq!(record["name"], "Local Edit");
        assert!(h.engine.conflicts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_conflict_use_remote_applies_stored_payload() {
        let server = MockServer::start().await;
        let h = harness(&server, SyncConfig::default()).await;

        let (meta, payload) = seed_conflict();
        h.metadata.upsert(&meta).await.unwrap();
        h.local
            .upsert("customers", Some("local-1"), &json!({"name": "Local Edit"}))
            .await
            .unwrap();

        let resolved = h
            .engine
            .resolve_conflict(&meta.id, ConflictChoice::UseRemote)
            .await
            .unwrap();
        assert_eq!(resolved.sync_status, SyncStatus::Synced);
        assert!(resolved.conflict_payload.is_none());

        let record = h.local.get("customers", "local-1").await.unwrap().unwrap();
        assert_eq!(record["name"], payload.remote["name"]);
        assert_eq!(record["status"], "active");
    }

    #[tokio::test]
    async fn test_resolve_conflict_guards() {
        let server = MockServer::start().await;
        let h = harness(&server, SyncConfig::default()).await;

        let missing = h
            .engine
            .resolve_conflict("no-such-id", ConflictChoice::UseLocal)
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        let meta = SyncMetadata::new_synced("customers", "local-1", "customer", "101", None);
        h.metadata.upsert(&meta).await.unwrap();
        let not_conflicted = h
            .engine
            .resolve_conflict(&meta.id, ConflictChoice::UseRemote)
            .await;
        assert!(matches!(not_conflicted, Err(Error::InvalidInput(_))));
    }
}
