//! Classification of upstream HTTP failures.
//!
//! NetSuite reuses status codes ambiguously: a 401 whose body mentions a
//! timeout means the request timed out, a 401 mentioning "Invalid Login
//! Attempt" is concurrency governance (rate limiting), and a 403 claiming a
//! field "does not exist" means the caller lacks permission to see it. The
//! classifier reads the body first and falls back to the literal status
//! code, producing one [`ClassifiedError`] with a fixed retry policy.

use std::time::Duration;

use ledgerbridge_common::{ClassifiedError, ErrorCategory};

/// Pause applied to rate-limit classifications without a server hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(5000);

/// Longest body excerpt carried on a classified error.
const RAW_BODY_LIMIT: usize = 2000;

/// Map a non-2xx response to a classified error.
///
/// `retry_after` is the parsed `Retry-After` hint when the server sent one;
/// it is attached verbatim so retry pacing follows the server's word.
pub fn classify(status: u16, body: &str, retry_after: Option<Duration>) -> ClassifiedError {
    let lowered = body.to_lowercase();
    let category = categorize(status, &lowered);
    let message =
        error_message_from_body(body).unwrap_or_else(|| fallback_message(status, body));

    let mut classified = ClassifiedError::new(category, message, Some(status));
    if let Some(hint) = retry_after {
        classified = classified.with_retry_after(hint);
    } else if category == ErrorCategory::RateLimited {
        classified = classified.with_retry_after(DEFAULT_RETRY_AFTER);
    }
    if !body.trim().is_empty() {
        classified = classified.with_raw(truncated(body));
    }
    classified
}

/// Classify a request that never produced an HTTP response.
pub fn classify_network_error(err: &reqwest::Error) -> ClassifiedError {
    let category = if err.is_timeout() {
        ErrorCategory::Timeout
    } else {
        ErrorCategory::Network
    };
    ClassifiedError::new(category, err.to_string(), None)
}

/// Parse a `Retry-After` header value. Seconds form only; the upstream does
/// not send HTTP dates.
pub fn parse_retry_after(header: Option<&str>) -> Option<Duration> {
    let seconds = header?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

// Ordered predicate rules, body text before status code.
fn categorize(status: u16, lowered_body: &str) -> ErrorCategory {
    if lowered_body.contains("timeout") || lowered_body.contains("timed out") {
        return ErrorCategory::Timeout;
    }
    if lowered_body.contains("invalid login attempt") {
        return ErrorCategory::RateLimited;
    }
    if lowered_body.contains("request limit exceeded")
        || lowered_body.contains("concurrency limit")
    {
        return ErrorCategory::RateLimited;
    }
    if lowered_body.contains("invalid_grant") || lowered_body.contains("has been revoked") {
        return ErrorCategory::AuthInvalid;
    }
    if status == 403 && lowered_body.contains("does not exist") {
        return ErrorCategory::PermissionDenied;
    }

    match status {
        429 => ErrorCategory::RateLimited,
        401 => ErrorCategory::AuthExpired,
        403 => ErrorCategory::PermissionDenied,
        400 | 422 => ErrorCategory::Validation,
        404 => ErrorCategory::NotFound,
        408 => ErrorCategory::Timeout,
        s if s >= 500 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

/// Pull the most specific human-readable message out of an error body.
///
/// NetSuite's RFC 9457 problem bodies put the useful text in
/// `o:errorDetails[0].detail`; older shapes use `title`, `message`, or
/// `error`.
fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    if let Some(detail) = value
        .get("o:errorDetails")
        .and_then(|details| details.get(0))
        .and_then(|first| first.get("detail"))
        .and_then(|detail| detail.as_str())
    {
        return Some(detail.to_string());
    }
    for key in ["title", "message", "error"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }
    None
}

fn fallback_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        truncated(trimmed)
    }
}

fn truncated(body: &str) -> String {
    if body.len() <= RAW_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = RAW_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
