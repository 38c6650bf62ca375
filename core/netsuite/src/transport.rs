//! Single chokepoint for upstream HTTP calls.
//!
//! Every call through here is authenticated, admitted through the
//! concurrency limiter, retried with backoff, classified on failure, and
//! counted against the circuit breaker, so higher layers never duplicate
//! any of that.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use ledgerbridge_common::{ClassifiedError, Error, ErrorCategory, Result};

use crate::breaker::CircuitBreaker;
use crate::classify::{classify, classify_network_error, parse_retry_after};
use crate::config::NetSuiteConfig;
use crate::limiter::LimiterStats;
use crate::queue::{Priority, RequestQueue};
use crate::retry::RetryConfig;
use crate::tokens::TokenManager;

/// Successful calls between opportunistic concurrency restores.
const RESTORE_AFTER_SUCCESSES: u32 = 10;

/// One upstream call, before auth and standard headers are attached.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    pub priority: Priority,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
            headers: Vec::new(),
            priority: Priority::Normal,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Status, salient headers, and raw body of a 2xx response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

impl ApiResponse {
    /// Parse the body as JSON. An empty body (204) parses as JSON `null`,
    /// so `Option<T>` and `()` targets accept it.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| {
            Error::Serialization(format!(
                "Upstream response did not match the expected shape: {}",
                e
            ))
        })
    }
}

enum AttemptError {
    /// Token or store failure before the call went out; never retried here.
    Fatal(Error),
    /// HTTP-level failure, classified; retried per policy.
    Classified(ClassifiedError),
}

/// Authenticated, limited, retrying HTTP client for one account.
pub struct TransportClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    queue: RequestQueue,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    consecutive_successes: AtomicU32,
}

impl TransportClient {
    pub fn new(config: &NetSuiteConfig, tokens: Arc<TokenManager>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Could not build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            tokens,
            queue: RequestQueue::new(config.concurrency_limit),
            breaker: CircuitBreaker::new(),
            retry: RetryConfig::default(),
            consecutive_successes: AtomicU32::new(0),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// Issue a call and parse the JSON response body.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.execute(request).await?.json()
    }

    /// Issue a call, returning status, location, and raw body. Creates go
    /// through here because NetSuite answers them with 204 plus a
    /// `Location` header instead of a body.
    ///
    /// # Errors
    /// - [`Error::CircuitOpen`] while the breaker window is running
    /// - [`Error::Upstream`] once a classified failure is out of retries
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        if let Some(retry_in) = self.breaker.open_remaining() {
            return Err(Error::CircuitOpen { retry_in });
        }

        // One slot covers all retries of this call, so a retrying request
        // cannot multiply its upstream footprint.
        let _permit = self.queue.acquire(request.priority).await;

        let mut attempt: u32 = 0;
        loop {
            let classified = match self.try_once(&request).await {
                Ok(response) => {
                    self.note_success();
                    return Ok(response);
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Classified(classified)) => classified,
            };

            if classified.category == ErrorCategory::RateLimited {
                self.queue.limiter().reduce_concurrency();
            }
            if classified.category == ErrorCategory::AuthExpired {
                // A fresh token may resolve it; invalidate so the retry
                // refreshes before sending.
                self.tokens.invalidate().await;
            }

            if classified.retryable && attempt < self.retry.max_retries {
                let delay = self.retry.backoff(attempt, classified.retry_after);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    category = %classified.category,
                    "Retrying upstream call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            self.note_failure();
            return Err(Error::Upstream(classified));
        }
    }

    pub fn queue_stats(&self) -> LimiterStats {
        self.queue.stats()
    }

    async fn try_once(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, AttemptError> {
        let access_token = self
            .tokens
            .get_access_token()
            .await
            .map_err(AttemptError::Fatal)?;

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(ACCEPT, "application/json");
        if let Some(body) = &request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").json(body);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Err(AttemptError::Classified(classify_network_error(&e))),
        };

        let status = response.status();
        if status.is_success() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = response
                .text()
                .await
                .map_err(|e| AttemptError::Classified(classify_network_error(&e)))?;
            return Ok(ApiResponse {
                status: status.as_u16(),
                location,
                body,
            });
        }

        let retry_after = parse_retry_after(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body = response.text().await.unwrap_or_default();
        Err(AttemptError::Classified(classify(
            status.as_u16(),
            &body,
            retry_after,
        )))
    }

    fn note_success(&self) {
        self.breaker.record_success();
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes % RESTORE_AFTER_SUCCESSES == 0 {
            self.queue.limiter().restore_concurrency();
        }
    }

    fn note_failure(&self) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        self.breaker.record_failure();
    }
}
