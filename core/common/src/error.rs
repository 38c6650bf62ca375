//! Common error types for LedgerBridge.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for LedgerBridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// OAuth exchange or refresh failed; re-authorization is required.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// No tokens are stored for the account; the authorization flow has not run.
    #[error("No tokens stored for account '{0}'; complete the authorization flow first")]
    NoTokens(String),

    /// The circuit breaker is open; no upstream call was attempted.
    #[error("Circuit open after repeated upstream failures; retry in {}ms", retry_in.as_millis())]
    CircuitOpen {
        /// Time remaining until the circuit closes again.
        retry_in: Duration,
    },

    /// An upstream call failed with a classified category.
    #[error("{0}")]
    Upstream(ClassifiedError),

    /// A local store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Field translation between local and remote shapes failed.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the failed operation could plausibly succeed.
    ///
    /// Only classified upstream failures carry retryability; everything else
    /// (config, OAuth, store, mapping) needs intervention, not a retry.
    pub fn retryable(&self) -> bool {
        match self {
            Error::Upstream(classified) => classified.retryable,
            _ => false,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories the upstream's ambiguous HTTP responses normalize into.
///
/// The set is closed: every response maps to exactly one category, and each
/// category has a fixed retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The account's request budget is exhausted.
    RateLimited,
    /// The access token is stale; a refresh may resolve it.
    AuthExpired,
    /// Credentials are wrong; re-authorization is required.
    AuthInvalid,
    /// The caller lacks permission for the record or field.
    PermissionDenied,
    /// The request body was rejected by upstream validation.
    Validation,
    /// The record does not exist.
    NotFound,
    /// The upstream failed internally.
    ServerError,
    /// The request timed out.
    Timeout,
    /// The request never produced an HTTP response.
    Network,
    /// Anything that matched no rule.
    Unknown,
}

impl ErrorCategory {
    /// All categories, in classification order.
    pub const ALL: [ErrorCategory; 10] = [
        ErrorCategory::RateLimited,
        ErrorCategory::AuthExpired,
        ErrorCategory::AuthInvalid,
        ErrorCategory::PermissionDenied,
        ErrorCategory::Validation,
        ErrorCategory::NotFound,
        ErrorCategory::ServerError,
        ErrorCategory::Timeout,
        ErrorCategory::Network,
        ErrorCategory::Unknown,
    ];

    /// Fixed retry policy per category.
    ///
    /// `AuthExpired` is retryable because a fresh token may resolve it; the
    /// non-retryable categories need a code, data, or permission change.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimited
                | ErrorCategory::Timeout
                | ErrorCategory::ServerError
                | ErrorCategory::Network
                | ErrorCategory::AuthExpired
        )
    }

    /// Stable snake_case name, used in logs and error summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::AuthExpired => "auth_expired",
            ErrorCategory::AuthInvalid => "auth_invalid",
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified upstream failure.
///
/// Produced by the error classifier from a status code, response body, and
/// optional server pacing hint; never persisted, only propagated and logged.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    /// Normalized category.
    pub category: ErrorCategory,
    /// Human-readable description.
    pub message: String,
    /// HTTP status code, when a response was received.
    pub status_code: Option<u16>,
    /// Mirror of `category.retryable()`, precomputed for callers.
    pub retryable: bool,
    /// Server-dictated wait before the next attempt.
    pub retry_after: Option<Duration>,
    /// Raw response body, kept for diagnostics.
    pub raw: Option<String>,
}

impl ClassifiedError {
    /// Create a classified error; retryability follows the category.
    pub fn new(
        category: ErrorCategory,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            status_code,
            retryable: category.retryable(),
            retry_after: None,
            raw: None,
        }
    }

    /// Attach a server-supplied retry-after hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Attach the raw response body.
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(
                f,
                "Upstream error ({}, HTTP {}): {}",
                self.category, status, self.message
            ),
            None => write!(f, "Upstream error ({}): {}", self.category, self.message),
        }
    }
}
