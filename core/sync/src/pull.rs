//! Remote-to-local pull.
//!
//! One SuiteQL query fetches every changed row, then each row is applied
//! independently: a record that fails to translate or store is logged and
//! counted, never aborting the rest of the batch. Only the query itself
//! is fatal to a pull.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info};

use ledgerbridge_common::{Error, Result};
use ledgerbridge_netsuite::QueryClient;

use crate::conflict::{resolve, ConflictStrategy, Resolution};
use crate::mapper::EntityMapper;
use crate::metadata::{ConflictPayload, SyncMetadata, SyncStatus};
use crate::store::{LocalRecordStore, MetadataStore};

/// Outcome counters for one pull.
#[derive(Debug, Clone, Default)]
pub struct PullReport {
    /// Rows the query returned.
    pub pulled: u64,
    /// Rows that created a new local record.
    pub created: u64,
    /// Rows applied over an existing local record.
    pub updated: u64,
    /// Rows flagged, or still flagged, for manual resolution.
    pub conflicts: u64,
    /// Rows that could not be applied.
    pub errors: Vec<RecordError>,
}

/// One record that failed to apply.
#[derive(Debug, Clone)]
pub struct RecordError {
    pub record_id: String,
    pub message: String,
}

enum RowOutcome {
    Created,
    Updated,
    Conflicted,
    LocalKept,
}

/// Pull changed remote records and apply them to the local tables.
///
/// With a watermark only rows modified after it are fetched; without one
/// the whole entity is pulled.
pub async fn pull_delta(
    query: &QueryClient,
    mapper: &dyn EntityMapper,
    metadata: &dyn MetadataStore,
    local: &dyn LocalRecordStore,
    last_sync_time: Option<DateTime<Utc>>,
    strategy: ConflictStrategy,
) -> Result<PullReport> {
    let sql = match last_sync_time {
        Some(since) => mapper.build_delta_query(since),
        None => mapper.build_select_query(None, None, None),
    };
    let rows = query.query_all(&sql, None).await?;

    let mut report = PullReport {
        pulled: rows.len() as u64,
        ..PullReport::default()
    };

    for row in &rows {
        match apply_remote_row(mapper, metadata, local, row, strategy).await {
            Ok(RowOutcome::Created) => report.created += 1,
            Ok(RowOutcome::Updated) => report.updated += 1,
            Ok(RowOutcome::Conflicted) => report.conflicts += 1,
            Ok(RowOutcome::LocalKept) => {}
            Err(e) => {
                let record_id = mapper
                    .remote_id(row)
                    .unwrap_or_else(|| "unknown".to_string());
                error!(
                    entity = mapper.remote_type(),
                    record_id = %record_id,
                    error = %e,
                    "Failed to apply pulled record"
                );
                report.errors.push(RecordError {
                    record_id,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        entity = mapper.remote_type(),
        pulled = report.pulled,
        created = report.created,
        updated = report.updated,
        conflicts = report.conflicts,
        failed = report.errors.len(),
        "Pull finished"
    );
    Ok(report)
}

async fn apply_remote_row(
    mapper: &dyn EntityMapper,
    metadata: &dyn MetadataStore,
    local: &dyn LocalRecordStore,
    row: &Value,
    strategy: ConflictStrategy,
) -> Result<RowOutcome> {
    let remote_id = mapper
        .remote_id(row)
        .ok_or_else(|| Error::Mapping("Query row carries no id column".to_string()))?;
    let remote_modified = mapper.remote_modified(row);
    let translated = mapper.to_local(row)?;

    let mut meta = match metadata
        .find_by_remote(mapper.local_table(), &remote_id)
        .await?
    {
        Some(meta) => meta,
        None => {
            let local_id = local.upsert(mapper.local_table(), None, &translated).await?;
            let meta = SyncMetadata::new_synced(
                mapper.local_table(),
                local_id,
                mapper.remote_type(),
                remote_id,
                remote_modified,
            );
            metadata.upsert(&meta).await?;
            return Ok(RowOutcome::Created);
        }
    };

    match meta.sync_status {
        // The local copy also changed; the strategy picks a side.
        SyncStatus::PendingPush => {
            let decision = resolve(strategy, meta.last_modified_local, remote_modified);
            match decision.resolution {
                Resolution::UseLocal => Ok(RowOutcome::LocalKept),
                Resolution::UseRemote => {
                    local
                        .upsert(mapper.local_table(), Some(&meta.local_record_id), &translated)
                        .await?;
                    meta.mark_synced(remote_modified);
                    metadata.upsert(&meta).await?;
                    Ok(RowOutcome::Updated)
                }
                Resolution::FlagManual => {
                    let current = local
                        .get(mapper.local_table(), &meta.local_record_id)
                        .await?;
                    meta.mark_conflicted(ConflictPayload {
                        local: current,
                        remote: translated,
                        reason: decision.reason,
                        flagged_at: Utc::now(),
                    });
                    if remote_modified.is_some() {
                        meta.last_modified_remote = remote_modified;
                    }
                    metadata.upsert(&meta).await?;
                    Ok(RowOutcome::Conflicted)
                }
            }
        }
        // An unresolved conflict keeps its flag; only the stored remote
        // side is refreshed so resolution always works on current data.
        SyncStatus::Conflict => {
            if let Some(payload) = meta.conflict_payload.as_mut() {
                payload.remote = translated;
            } else {
                let current = local
                    .get(mapper.local_table(), &meta.local_record_id)
                    .await?;
                meta.mark_conflicted(ConflictPayload {
                    local: current,
                    remote: translated,
                    reason: "conflict persisted across pulls".to_string(),
                    flagged_at: Utc::now(),
                });
            }
            if remote_modified.is_some() {
                meta.last_modified_remote = remote_modified;
            }
            metadata.upsert(&meta).await?;
            Ok(RowOutcome::Conflicted)
        }
        // Error rows heal from the remote copy like clean ones.
        SyncStatus::Synced | SyncStatus::Error => {
            local
                .upsert(mapper.local_table(), Some(&meta.local_record_id), &translated)
                .await?;
            meta.mark_synced(remote_modified);
            metadata.upsert(&meta).await?;
            Ok(RowOutcome::Updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use ledgerbridge_common::AccountId;
    use ledgerbridge_netsuite::{
        MemorySecretStore, NetSuiteConfig, TokenManager, TokenSet, TransportClient,
    };

    use super::*;
    use crate::mappers::CustomerMapper;
    use crate::memory::{MemoryLocalStore, MemoryMetadataStore};

    async fn query_client(server: &MockServer) -> QueryClient {
        let config = NetSuiteConfig::new(
            AccountId::new("1234567").unwrap(),
            "client-id",
            "client-secret",
            "https://localhost/callback",
            "seal-key",
        )
        .unwrap()
        .with_rest_base(server.uri());

        let tokens = Arc::new(
            TokenManager::new(&config, Arc::new(MemorySecretStore::new())).unwrap(),
        );
        tokens
            .store_tokens(TokenSet {
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                expires_in: 3600,
                token_type: "Bearer".to_string(),
                issued_at: Utc::now(),
            })
            .await
            .unwrap();

        let transport = Arc::new(TransportClient::new(&config, tokens).unwrap());
        QueryClient::new(config, transport)
    }

    fn customer_row(id: &str, name: &str, modified: &str) -> Value {
        json!({
            "id": id,
            "entityid": name,
            "companyname": format!("{} Inc", name),
            "email": format!("{}@example.test", name.to_lowercase()),
            "isinactive": "F",
            "lastmodifieddate": modified,
        })
    }

    fn mount_rows(rows: Vec<Value>) -> Mock {
        Mock::given(method("POST"))
            .and(path("/services/rest/query/v1/suiteql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": rows,
                "hasMore": false
            })))
    }

    #[tokio::test]
    async fn test_first_pull_creates_local_records() {
        let server = MockServer::start().await;
        let query = query_client(&server).await;
        let metadata = MemoryMetadataStore::new();
        let local = MemoryLocalStore::new();

        mount_rows(vec![
            customer_row("101", "Acme", "2024-05-01 10:00:00"),
            customer_row("102", "Globex", "2024-05-02 11:00:00"),
        ])
        .mount(&server)
        .await;

        let report = pull_delta(
            &query,
            &CustomerMapper,
            &metadata,
            &local,
            None,
            ConflictStrategy::NewestWins,
        )
        .await
        .unwrap();

        assert_eq!(report.pulled, 2);
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert!(report.errors.is_empty());

        let meta = metadata
            .find_by_remote("customers", "101")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.sync_status, SyncStatus::Synced);
        assert!(meta.last_modified_remote.is_some());

        let record = local
            .get("customers", &meta.local_record_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["name"], "Acme");
        assert_eq!(record["company_name"], "Acme Inc");
        assert_eq!(record["status"], "active");
    }

    #[tokio::test]
    async fn test_repeated_pull_updates_without_duplicates() {
        let server = MockServer::start().await;
        let query = query_client(&server).await;
        let metadata = MemoryMetadataStore::new();
        let local = MemoryLocalStore::new();

        mount_rows(vec![customer_row("101", "Acme", "2024-05-01 10:00:00")])
            .mount(&server)
            .await;

        for _ in 0..2 {
            pull_delta(
                &query,
                &CustomerMapper,
                &metadata,
                &local,
                None,
                ConflictStrategy::NewestWins,
            )
            .await
            .unwrap();
        }

        let synced = metadata.all_with_status(SyncStatus::Synced).await.unwrap();
        assert_eq!(synced.len(), 1);
    }

    #[tokio::test]
    async fn test_delta_pull_queries_after_watermark() {
        let server = MockServer::start().await;
        let query = query_client(&server).await;
        let metadata = MemoryMetadataStore::new();
        let local = MemoryLocalStore::new();

        let since: DateTime<Utc> = "2024-03-01T00:00:00Z".parse().unwrap();
        let expected_sql = CustomerMapper.build_delta_query(since);
        Mock::given(method("POST"))
            .and(path("/services/rest/query/v1/suiteql"))
            .and(body_json(json!({ "q": expected_sql })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [],
                "hasMore": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let report = pull_delta(
            &query,
            &CustomerMapper,
            &metadata,
            &local,
            Some(since),
            ConflictStrategy::NewestWins,
        )
        .await
        .unwrap();
        assert_eq!(report.pulled, 0);
    }

    #[tokio::test]
    async fn test_newest_wins_keeps_newer_local_edit() {
        let server = MockServer::start().await;
        let query = query_client(&server).await;
        let metadata = MemoryMetadataStore::new();
        let local = MemoryLocalStore::new();

        let local_id = local
            .upsert("customers", None, &json!({"name": "Local Edit"}))
            .await
            .unwrap();
        let mut meta = SyncMetadata::new_pending("customers", local_id.clone(), "customer");
        meta.remote_id = Some("101".to_string());
        metadata.upsert(&meta).await.unwrap();

        // new_pending stamped last_modified_local with now, far newer than
        // the remote row's 2024 timestamp.
        mount_rows(vec![customer_row("101", "Remote", "2024-05-01 10:00:00")])
            .mount(&server)
            .await;

        let report = pull_delta(
            &query,
            &CustomerMapper,
            &metadata,
            &local,
            None,
            ConflictStrategy::NewestWins,
        )
        .await
        .unwrap();

        assert_eq!(report.pulled, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.conflicts, 0);

        let record = local.get("customers", &local_id).await.unwrap().unwrap();
        assert_eq!(record["name"], "Local Edit");
        let meta = metadata.get(&meta.id).await.unwrap().unwrap();
        assert_eq!(meta.sync_status, SyncStatus::PendingPush);
    }

    #[tokio::test]
    async fn test_newest_wins_applies_newer_remote() {
        let server = MockServer::start().await;
        let query = query_client(&server).await;
        let metadata = MemoryMetadataStore::new();
        let local = MemoryLocalStore::new();

        let local_id = local
            .upsert("customers", None, &json!({"name": "Local Edit"}))
            .await
            .unwrap();
        let mut meta = SyncMetadata::new_pending("customers", local_id.clone(), "customer");
        meta.remote_id = Some("101".to_string());
        meta.last_modified_local = Some("2024-01-01T00:00:00Z".parse().unwrap());
        metadata.upsert(&meta).await.unwrap();

        mount_rows(vec![customer_row("101", "Remote", "2024-06-01 10:00:00")])
            .mount(&server)
            .await;

        let report = pull_delta(
            &query,
            &CustomerMapper,
            &metadata,
            &local,
            None,
            ConflictStrategy::NewestWins,
        )
        .await
        .unwrap();

        assert_eq!(report.updated, 1);
        let record = local.get("customers", &local_id).await.unwrap().unwrap();
        assert_eq!(record["name"], "Remote");
        let meta = metadata.get(&meta.id).await.unwrap().unwrap();
        assert_eq!(meta.sync_status, SyncStatus::Synced);
        assert_eq!(meta.retry_count, 0);
    }

    #[tokio::test]
    async fn test_manual_strategy_flags_both_sides() {
        let server = MockServer::start().await;
        let query = query_client(&server).await;
        let metadata = MemoryMetadataStore::new();
        let local = MemoryLocalStore::new();

        let local_id = local
            .upsert("customers", None, &json!({"name": "Local Edit"}))
            .await
            .unwrap();
        let mut meta = SyncMetadata::new_pending("customers", local_id.clone(), "customer");
        meta.remote_id = Some("101".to_string());
        metadata.upsert(&meta).await.unwrap();

        mount_rows(vec![customer_row("101", "Remote", "2024-05-01 10:00:00")])
            .mount(&server)
            .await;

        let report = pull_delta(
            &query,
            &CustomerMapper,
            &metadata,
            &local,
            None,
            ConflictStrategy::Manual,
        )
        .await
        .unwrap();

        assert_eq!(report.conflicts, 1);

        let meta = metadata.get(&meta.id).await.unwrap().unwrap();
        assert_eq!(meta.sync_status, SyncStatus::Conflict);
        let payload = meta.conflict_payload.unwrap();
        assert_eq!(payload.local.unwrap()["name"], "Local Edit");
        assert_eq!(payload.remote["name"], "Remote");

        // The local table itself is untouched until someone resolves.
        let record = local.get("customers", &local_id).await.unwrap().unwrap();
        assert_eq!(record["name"], "Local Edit");
    }

    #[tokio::test]
    async fn test_row_without_id_is_isolated() {
        let server = MockServer::start().await;
        let query = query_client(&server).await;
        let metadata = MemoryMetadataStore::new();
        let local = MemoryLocalStore::new();

        let mut broken = customer_row("0", "Broken", "2024-05-01 10:00:00");
        broken.as_object_mut().unwrap().remove("id");
        mount_rows(vec![broken, customer_row("102", "Fine", "2024-05-01 10:00:00")])
            .mount(&server)
            .await;

        let report = pull_delta(
            &query,
            &CustomerMapper,
            &metadata,
            &local,
            None,
            ConflictStrategy::NewestWins,
        )
        .await
        .unwrap();

        assert_eq!(report.pulled, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].record_id, "unknown");
        assert!(metadata
            .find_by_remote("customers", "102")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_query_failure_aborts_pull() {
        let server = MockServer::start().await;
        let query = query_client(&server).await;
        let metadata = MemoryMetadataStore::new();
        let local = MemoryLocalStore::new();

        Mock::given(method("POST"))
            .and(path("/services/rest/query/v1/suiteql"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "title": "Invalid search query"
            })))
            .mount(&server)
            .await;

        let result = pull_delta(
            &query,
            &CustomerMapper,
            &metadata,
            &local,
            None,
            ConflictStrategy::NewestWins,
        )
        .await;
        assert!(result.is_err());
    }
}
