//! In-memory stores for tests, development, and the CLI demo loop.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use ledgerbridge_common::{Error, Result};

use crate::metadata::{SyncMetadata, SyncStatus};
use crate::runlog::{RunStatus, SyncDirection, SyncRunLog};
use crate::store::{LocalRecordStore, MetadataStore, RunLogStore};

/// [`MetadataStore`] backed by a map keyed by row id.
#[derive(Default)]
pub struct MemoryMetadataStore {
    rows: RwLock<HashMap<String, SyncMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload rows, e.g. from a state file.
    pub fn from_rows(rows: Vec<SyncMetadata>) -> Self {
        Self {
            rows: RwLock::new(rows.into_iter().map(|m| (m.id.clone(), m)).collect()),
        }
    }

    /// Every row, for persisting to a state file.
    pub async fn snapshot(&self) -> Vec<SyncMetadata> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, id: &str) -> Result<Option<SyncMetadata>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_remote(
        &self,
        local_table: &str,
        remote_id: &str,
    ) -> Result<Option<SyncMetadata>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|m| m.local_table == local_table && m.remote_id.as_deref() == Some(remote_id))
            .cloned())
    }

    async fn find_by_status(
        &self,
        local_table: &str,
        status: SyncStatus,
    ) -> Result<Vec<SyncMetadata>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|m| m.local_table == local_table && m.sync_status == status)
            .cloned()
            .collect())
    }

    async fn all_with_status(&self, status: SyncStatus) -> Result<Vec<SyncMetadata>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|m| m.sync_status == status)
            .cloned()
            .collect())
    }

    async fn upsert(&self, meta: &SyncMetadata) -> Result<()> {
        self.rows
            .write()
            .await
            .insert(meta.id.clone(), meta.clone());
        Ok(())
    }
}

/// [`RunLogStore`] backed by a vector.
#[derive(Default)]
pub struct MemoryRunLogStore {
    runs: RwLock<Vec<SyncRunLog>>,
}

impl MemoryRunLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_runs(runs: Vec<SyncRunLog>) -> Self {
        Self {
            runs: RwLock::new(runs),
        }
    }

    pub async fn snapshot(&self) -> Vec<SyncRunLog> {
        self.runs.read().await.clone()
    }
}

#[async_trait]
impl RunLogStore for MemoryRunLogStore {
    async fn insert(&self, run: &SyncRunLog) -> Result<()> {
        self.runs.write().await.push(run.clone());
        Ok(())
    }

    async fn update(&self, run: &SyncRunLog) -> Result<()> {
        let mut runs = self.runs.write().await;
        match runs.iter_mut().find(|existing| existing.id == run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("No sync run with id {}", run.id))),
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SyncRunLog>> {
        let runs = self.runs.read().await;
        let mut sorted: Vec<SyncRunLog> = runs.clone();
        sorted.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sorted.truncate(limit);
        Ok(sorted)
    }

    async fn last_completed(
        &self,
        entity_type: &str,
        direction: SyncDirection,
    ) -> Result<Option<SyncRunLog>> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .filter(|run| {
                run.status == RunStatus::Completed
                    && run.entity_type == entity_type
                    && run.direction == direction
            })
            .max_by_key(|run| run.completed_at)
            .cloned())
    }
}

/// [`LocalRecordStore`] keeping JSON rows per table.
///
/// Updates merge object fields over the existing row so locally-owned
/// columns survive partial remote payloads.
#[derive(Default)]
pub struct MemoryLocalStore {
    tables: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: HashMap<String, HashMap<String, Value>>) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn snapshot(&self) -> HashMap<String, HashMap<String, Value>> {
        self.tables.read().await.clone()
    }
}

#[async_trait]
impl LocalRecordStore for MemoryLocalStore {
    async fn upsert(&self, table: &str, id: Option<&str>, data: &Value) -> Result<String> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let merged = match (rows.get(&id), data) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                let mut merged = existing.clone();
                for (key, value) in incoming {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            _ => data.clone(),
        };
        rows.insert(id.clone(), merged);
        Ok(id)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Value>> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|rows| rows.get(id)).cloned())
    }
}
