//! Record-oriented CRUD against the REST record API.
//!
//! NetSuite answers creates and transforms with `204 No Content` plus a
//! `Location` header naming the new record, so those paths go through the
//! transport's raw response instead of a parsed body.

use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use ledgerbridge_common::{Error, Result};

use crate::config::NetSuiteConfig;
use crate::queue::Priority;
use crate::transport::{ApiRequest, ApiResponse, TransportClient};

/// Header carrying a client-generated deduplication key on creates.
pub const IDEMPOTENCY_KEY_HEADER: &str = "X-NetSuite-Idempotency-Key";

/// Page size used when walking a whole collection.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

const HOUR_BUCKET_MS: i64 = 3_600_000;

/// One page of records or query rows, with the upstream's more-to-come flag.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultPage {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default, rename = "hasMore")]
    pub has_more: bool,
}

/// Deterministic key for deduplicating create retries.
///
/// Retries of the same create inside one hour bucket reuse the identical
/// key so the upstream drops duplicates; a retry in a later bucket counts
/// as a fresh attempt, bounding how long a stale key can suppress a
/// legitimately new create.
pub fn generate_idempotency_key(
    operation: &str,
    remote_type: &str,
    local_id: &str,
    timestamp_ms: i64,
) -> String {
    let hour_bucket = timestamp_ms.div_euclid(HOUR_BUCKET_MS);
    format!("{}:{}:{}:{}", operation, remote_type, local_id, hour_bucket)
}

/// Typed CRUD over the transport for one account.
#[derive(Clone)]
pub struct ResourceClient {
    config: NetSuiteConfig,
    transport: Arc<TransportClient>,
    priority: Priority,
}

impl ResourceClient {
    pub fn new(config: NetSuiteConfig, transport: Arc<TransportClient>) -> Self {
        Self {
            config,
            transport,
            priority: Priority::Normal,
        }
    }

    /// A handle issuing the same calls at a different priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Fetch one record, optionally trimmed to the named fields.
    pub async fn get(
        &self,
        record_type: &str,
        id: &str,
        fields: Option<&[String]>,
    ) -> Result<Value> {
        let mut url = self.config.record_url(record_type, Some(id))?;
        if let Some(fields) = fields {
            url.query_pairs_mut().append_pair("fields", &fields.join(","));
        }
        self.transport
            .request(ApiRequest::new(Method::GET, url).with_priority(self.priority))
            .await
    }

    /// Fetch one page of a collection.
    pub async fn list(
        &self,
        record_type: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<ResultPage> {
        let mut url = self.config.record_url(record_type, None)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(limit) = limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = offset {
                pairs.append_pair("offset", &offset.to_string());
            }
        }
        self.transport
            .request(ApiRequest::new(Method::GET, url).with_priority(self.priority))
            .await
    }

    /// Walk a whole collection page by page.
    pub async fn list_all(&self, record_type: &str, page_size: Option<u32>) -> Result<Vec<Value>> {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.list(record_type, Some(page_size), Some(offset)).await?;
            let fetched = page.items.len();
            records.extend(page.items);
            // An empty page cannot advance the offset.
            if !page.has_more || fetched == 0 {
                break;
            }
            offset += page_size;
        }
        Ok(records)
    }

    /// Create a record, returning the new record's id.
    ///
    /// The id comes from the response body when one is present, otherwise
    /// from the `Location` header's final path segment.
    pub async fn create(
        &self,
        record_type: &str,
        data: &Value,
        idempotency_key: Option<&str>,
    ) -> Result<String> {
        let url = self.config.record_url(record_type, None)?;
        let mut request = ApiRequest::new(Method::POST, url)
            .with_body(data.clone())
            .with_priority(self.priority);
        if let Some(key) = idempotency_key {
            request = request.with_header(IDEMPOTENCY_KEY_HEADER, key);
        }

        let response = self.transport.execute(request).await?;
        let id = id_from_response(&response)?;
        debug!(record_type, id = %id, "Created remote record");
        Ok(id)
    }

    /// Partially update a record.
    pub async fn update(&self, record_type: &str, id: &str, data: &Value) -> Result<()> {
        let url = self.config.record_url(record_type, Some(id))?;
        self.transport
            .execute(
                ApiRequest::new(Method::PATCH, url)
                    .with_body(data.clone())
                    .with_priority(self.priority),
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, record_type: &str, id: &str) -> Result<()> {
        let url = self.config.record_url(record_type, Some(id))?;
        self.transport
            .execute(ApiRequest::new(Method::DELETE, url).with_priority(self.priority))
            .await?;
        Ok(())
    }

    /// Server-side record conversion, e.g. a sales order into an invoice.
    pub async fn transform(
        &self,
        source_type: &str,
        source_id: &str,
        target_type: &str,
        data: Option<&Value>,
    ) -> Result<String> {
        let url = self
            .config
            .transform_url(source_type, source_id, target_type)?;
        let body = data.cloned().unwrap_or_else(|| serde_json::json!({}));
        let response = self
            .transport
            .execute(
                ApiRequest::new(Method::POST, url)
                    .with_body(body)
                    .with_priority(self.priority),
            )
            .await?;
        id_from_response(&response)
    }
}

fn id_from_response(response: &ApiResponse) -> Result<String> {
    if !response.body.trim().is_empty() {
        if let Ok(value) = response.json::<Value>() {
            if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
                return Ok(id.to_string());
            }
        }
    }
    if let Some(location) = &response.location {
        if let Some(id) = location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
        {
            return Ok(id.to_string());
        }
    }
    Err(Error::Serialization(
        "Create response carried no record id".to_string(),
    ))
}
