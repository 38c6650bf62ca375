//! Bulk SQL-like reads over the SuiteQL endpoint.
//!
//! Delta pulls go through here: one query returns every changed record,
//! where the record API would cost one call each. Pagination rides URL
//! parameters; the SQL itself stays fixed across pages.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use ledgerbridge_common::{Error, Result};

use crate::config::NetSuiteConfig;
use crate::queue::Priority;
use crate::records::ResultPage;
use crate::transport::{ApiRequest, TransportClient};

/// Hard ceiling on rows one `query_all` will accumulate.
pub const QUERY_ROW_CAP: usize = 100_000;

/// Page size used when walking a whole result set.
pub const DEFAULT_QUERY_PAGE_SIZE: u32 = 1000;

/// SuiteQL client for one account.
#[derive(Clone)]
pub struct QueryClient {
    config: NetSuiteConfig,
    transport: Arc<TransportClient>,
    priority: Priority,
    row_cap: usize,
}

impl QueryClient {
    pub fn new(config: NetSuiteConfig, transport: Arc<TransportClient>) -> Self {
        Self {
            config,
            transport,
            priority: Priority::Normal,
            row_cap: QUERY_ROW_CAP,
        }
    }

    /// A handle issuing the same queries at a different priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Lower the row ceiling; callers that only need a sample use this.
    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.row_cap = row_cap.max(1);
        self
    }

    /// Run one page of a query.
    pub async fn query(&self, sql: &str, limit: u32, offset: u32) -> Result<ResultPage> {
        let url = self.config.suiteql_url(limit, offset)?;
        let request = ApiRequest::new(Method::POST, url)
            .with_body(serde_json::json!({ "q": sql }))
            // SuiteQL rejects requests without this preference.
            .with_header("Prefer", "transient")
            .with_priority(self.priority);
        self.transport.request(request).await
    }

    /// Collect every row of a query, paging until `hasMore` clears or the
    /// row cap is hit.
    pub async fn query_all(&self, sql: &str, page_size: Option<u32>) -> Result<Vec<Value>> {
        let page_size = page_size.unwrap_or(DEFAULT_QUERY_PAGE_SIZE).max(1);
        let mut rows = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = self.query(sql, page_size, offset).await?;
            let fetched = page.items.len();
            rows.extend(page.items);

            if rows.len() >= self.row_cap {
                warn!(
                    cap = self.row_cap,
                    "Query result hit the row cap, truncating"
                );
                rows.truncate(self.row_cap);
                break;
            }
            // An empty page cannot advance the offset.
            if !page.has_more || fetched == 0 {
                break;
            }
            offset += page_size;
        }
        Ok(rows)
    }

    /// First value of the first row, or `None` on an empty result.
    ///
    /// Meant for single-column queries (counts, max timestamps); the
    /// upstream's `links` bookkeeping key is skipped.
    pub async fn query_scalar<T: DeserializeOwned>(&self, sql: &str) -> Result<Option<T>> {
        let page = self.query(sql, 1, 0).await?;
        let row = match page.items.into_iter().next() {
            Some(row) => row,
            None => return Ok(None),
        };

        let value = match row {
            Value::Object(map) => map
                .into_iter()
                .find(|(key, _)| key != "links")
                .map(|(_, value)| value),
            other => Some(other),
        };
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                Error::Serialization(format!("Scalar value did not match the expected type: {}", e))
            }),
        }
    }
}
