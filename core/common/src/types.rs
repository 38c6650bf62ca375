//! Common types used throughout LedgerBridge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the upstream account one engine instance talks to.
///
/// Also the key under which the account's encrypted tokens are stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new AccountId from a string.
    ///
    /// # Preconditions
    /// - `id` must be non-empty
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "AccountId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The account id as a domain label: lowercased, underscores replaced
    /// by hyphens (the upstream hosts sandbox accounts like `12345_SB1`
    /// under `12345-sb1.*` domains).
    pub fn domain_label(&self) -> String {
        self.0.to_lowercase().replace('_', "-")
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
