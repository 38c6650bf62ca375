//! Encrypted-at-rest persistence for OAuth token sets.
//!
//! The token manager seals access and refresh tokens before they reach a
//! store, so implementations only ever handle ciphertext. One record per
//! account; upserts replace the whole record.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use ledgerbridge_common::{Error, Result};

/// One account's sealed token material plus plaintext bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokenRecord {
    pub account: String,
    #[serde(with = "b64")]
    pub sealed_access_token: Vec<u8>,
    #[serde(with = "b64")]
    pub sealed_refresh_token: Vec<u8>,
    pub expires_in: u64,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
}

/// Persistence for sealed token records.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert or replace the record for `record.account`.
    async fn upsert(&self, record: StoredTokenRecord) -> Result<()>;

    /// Fetch the record for an account, `None` when absent.
    async fn load(&self, account: &str) -> Result<Option<StoredTokenRecord>>;

    /// Remove an account's record. Deleting an absent record is not an error.
    async fn delete(&self, account: &str) -> Result<()>;
}

/// In-memory store for tests and short-lived processes.
#[derive(Default)]
pub struct MemorySecretStore {
    records: RwLock<HashMap<String, StoredTokenRecord>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn upsert(&self, record: StoredTokenRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.account.clone(), record);
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Option<StoredTokenRecord>> {
        let records = self.records.read().await;
        Ok(records.get(account).cloned())
    }

    async fn delete(&self, account: &str) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(account);
        Ok(())
    }
}

/// JSON-file store, one file holding every account's record.
///
/// Suited to CLI use where a single process owns the file. Reads tolerate a
/// missing file (no accounts yet); writes create parent directories.
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<HashMap<String, StoredTokenRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Store(format!(
                    "Corrupt token store at {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, records: &HashMap<String, StoredTokenRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| Error::Serialization(format!("Token record encoding failed: {}", e)))?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn upsert(&self, record: StoredTokenRecord) -> Result<()> {
        let mut records = self.read_all().await?;
        records.insert(record.account.clone(), record);
        self.write_all(&records).await
    }

    async fn load(&self, account: &str) -> Result<Option<StoredTokenRecord>> {
        let records = self.read_all().await?;
        Ok(records.get(account).cloned())
    }

    async fn delete(&self, account: &str) -> Result<()> {
        let mut records = self.read_all().await?;
        if records.remove(account).is_some() {
            self.write_all(&records).await?;
        }
        Ok(())
    }
}

/// Base64 for sealed blobs inside JSON records.
mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
