//! Persistence seams for sync bookkeeping and local records.
//!
//! The engine never touches entity tables or a database directly; these
//! traits are its only coupling to local persistence.

use async_trait::async_trait;
use serde_json::Value;

use ledgerbridge_common::Result;

use crate::metadata::{SyncMetadata, SyncStatus};
use crate::runlog::{SyncDirection, SyncRunLog};

/// Storage for [`SyncMetadata`] rows.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load one row by id.
    async fn get(&self, id: &str) -> Result<Option<SyncMetadata>>;

    /// Load the row linking a local table to a remote record id.
    async fn find_by_remote(
        &self,
        local_table: &str,
        remote_id: &str,
    ) -> Result<Option<SyncMetadata>>;

    /// All rows for one table in the given status.
    async fn find_by_status(
        &self,
        local_table: &str,
        status: SyncStatus,
    ) -> Result<Vec<SyncMetadata>>;

    /// All rows in the given status, across tables.
    async fn all_with_status(&self, status: SyncStatus) -> Result<Vec<SyncMetadata>>;

    /// Insert or replace a row by id.
    async fn upsert(&self, meta: &SyncMetadata) -> Result<()>;
}

/// Storage for [`SyncRunLog`] rows.
#[async_trait]
pub trait RunLogStore: Send + Sync {
    /// Record a freshly started run.
    async fn insert(&self, run: &SyncRunLog) -> Result<()>;

    /// Replace a run by id, normally at completion.
    async fn update(&self, run: &SyncRunLog) -> Result<()>;

    /// Most recent runs first.
    async fn recent(&self, limit: usize) -> Result<Vec<SyncRunLog>>;

    /// The most recently completed run for an entity and direction.
    async fn last_completed(
        &self,
        entity_type: &str,
        direction: SyncDirection,
    ) -> Result<Option<SyncRunLog>>;
}

/// Point access to the actual local entity tables.
#[async_trait]
pub trait LocalRecordStore: Send + Sync {
    /// Create (`id = None`) or update a record; returns its id.
    async fn upsert(&self, table: &str, id: Option<&str>, data: &Value) -> Result<String>;

    /// Load a record by table and id.
    async fn get(&self, table: &str, id: &str) -> Result<Option<Value>>;
}
