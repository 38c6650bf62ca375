//! NetSuite access layer: OAuth grants and token lifecycle, adaptive
//! admission control, failure classification, and typed REST/SuiteQL
//! clients.
//!
//! Every upstream call funnels through [`transport::TransportClient`],
//! which authenticates, rate-limits, retries, and classifies identically
//! for all callers. [`client::NetSuiteClient`] wires one account's pieces
//! together.

pub mod breaker;
pub mod classify;
pub mod client;
pub mod config;
pub mod limiter;
pub mod oauth;
pub mod query;
pub mod queue;
pub mod records;
pub mod retry;
pub mod secrets;
pub mod tokens;
pub mod transport;

pub use breaker::CircuitBreaker;
pub use client::NetSuiteClient;
pub use config::NetSuiteConfig;
pub use limiter::{ConcurrencyLimiter, LimiterStats};
pub use query::QueryClient;
pub use queue::{Priority, RequestQueue};
pub use records::{
    generate_idempotency_key, ResourceClient, ResultPage, IDEMPOTENCY_KEY_HEADER,
};
pub use retry::RetryConfig;
pub use secrets::{FileSecretStore, MemorySecretStore, SecretStore, StoredTokenRecord};
pub use tokens::{TokenManager, TokenRefresher, TokenSet};
pub use transport::{ApiRequest, ApiResponse, TransportClient};
