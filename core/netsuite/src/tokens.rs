//! OAuth token lifecycle: load, cache, proactively refresh, persist.
//!
//! One [`TokenManager`] per account owns that account's token set. Tokens
//! are refreshed before they expire (at 80% of their lifetime) so no
//! request is ever sent with a token about to lapse, and a refresh replaces
//! the cached and persisted set atomically from a caller's perspective.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use ledgerbridge_common::{AccountId, Error, Result};
use ledgerbridge_crypto::{decrypt, encrypt, SecretKey};

use crate::config::NetSuiteConfig;
use crate::oauth;
use crate::secrets::{SecretStore, StoredTokenRecord};

/// Fraction of a token's lifetime after which it is refreshed.
pub const REFRESH_THRESHOLD: f64 = 0.8;

/// Fixed salt for sealing this integration's tokens.
const TOKEN_SALT: &[u8] = b"ledgerbridge/netsuite/oauth-tokens/v1";

/// One account's OAuth credentials.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds, as reported by the server.
    pub expires_in: u64,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
}

impl TokenSet {
    /// True once at least [`REFRESH_THRESHOLD`] of the lifetime has elapsed.
    pub fn needs_refresh(&self) -> bool {
        let elapsed_ms = (Utc::now() - self.issued_at).num_milliseconds();
        if elapsed_ms < 0 {
            return false;
        }
        elapsed_ms as f64 >= REFRESH_THRESHOLD * (self.expires_in as f64 * 1000.0)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.expires_in as i64)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Seam for the refresh grant, so the manager can be driven without a
/// network in tests.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet>;
}

/// Production refresher backed by the account's token endpoint.
pub struct OAuthRefresher {
    config: NetSuiteConfig,
}

impl OAuthRefresher {
    pub fn new(config: NetSuiteConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        oauth::refresh(&self.config, refresh_token).await
    }
}

struct TokenCache {
    tokens: Option<TokenSet>,
    /// Set by [`TokenManager::invalidate`]; forces a refresh on next use.
    stale: bool,
}

/// Owns one account's token set: caches it in memory, seals it into the
/// secret store, and refreshes it through the configured refresher.
///
/// Refreshes are serialized behind a write lock: concurrent callers that
/// hit the threshold together produce exactly one refresh grant, and the
/// rest pick up the replacement.
pub struct TokenManager {
    account: AccountId,
    seal_key: SecretKey,
    store: Arc<dyn SecretStore>,
    refresher: Arc<dyn TokenRefresher>,
    cache: RwLock<TokenCache>,
}

impl TokenManager {
    pub fn new(config: &NetSuiteConfig, store: Arc<dyn SecretStore>) -> Result<Self> {
        let seal_key = SecretKey::from_passphrase(&config.token_encryption_key)?;
        Ok(Self {
            account: config.account_id.clone(),
            seal_key,
            store,
            refresher: Arc::new(OAuthRefresher::new(config.clone())),
            cache: RwLock::new(TokenCache {
                tokens: None,
                stale: false,
            }),
        })
    }

    /// Replace the refresher. Tests use this to count and stub refreshes.
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = refresher;
        self
    }

    /// Return a valid access token, refreshing first when the cached set is
    /// past its threshold or was invalidated.
    ///
    /// # Errors
    /// - [`Error::NoTokens`] when the account has never completed the
    ///   authorization flow
    /// - [`Error::OAuth`] when the refresh grant is rejected
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if !cache.stale {
                if let Some(tokens) = &cache.tokens {
                    if !tokens.needs_refresh() {
                        return Ok(tokens.access_token.clone());
                    }
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Re-check under the write lock: another caller may have refreshed
        // while this one waited.
        if cache.tokens.is_none() {
            cache.tokens = self.load_from_store().await?;
        }
        let tokens = match &cache.tokens {
            Some(tokens) => tokens,
            None => return Err(Error::NoTokens(self.account.as_str().to_string())),
        };
        if !cache.stale && !tokens.needs_refresh() {
            return Ok(tokens.access_token.clone());
        }

        debug!(account = %self.account, "Access token past refresh threshold, refreshing");
        let refresh_token = tokens.refresh_token.clone();
        let refreshed = self.refresher.refresh(&refresh_token).await?;
        self.persist(&refreshed).await?;

        let access_token = refreshed.access_token.clone();
        cache.tokens = Some(refreshed);
        cache.stale = false;
        Ok(access_token)
    }

    /// Seal and persist a token set, replacing the cached one.
    pub async fn store_tokens(&self, tokens: TokenSet) -> Result<()> {
        let mut cache = self.cache.write().await;
        self.persist(&tokens).await?;
        cache.tokens = Some(tokens);
        cache.stale = false;
        Ok(())
    }

    /// Whether the account has a stored token set.
    pub async fn has_tokens(&self) -> Result<bool> {
        {
            let cache = self.cache.read().await;
            if cache.tokens.is_some() {
                return Ok(true);
            }
        }
        Ok(self.store.load(self.account.as_str()).await?.is_some())
    }

    /// Drop the account's tokens from cache and store.
    pub async fn clear_tokens(&self) -> Result<()> {
        let mut cache = self.cache.write().await;
        self.store.delete(self.account.as_str()).await?;
        cache.tokens = None;
        cache.stale = false;
        Ok(())
    }

    /// Mark the cached set stale so the next caller refreshes. Used by the
    /// transport after an auth-expired response.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.stale = true;
    }

    async fn load_from_store(&self) -> Result<Option<TokenSet>> {
        let record = match self.store.load(self.account.as_str()).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        Ok(Some(TokenSet {
            access_token: self.unseal(&record.sealed_access_token)?,
            refresh_token: self.unseal(&record.sealed_refresh_token)?,
            expires_in: record.expires_in,
            token_type: record.token_type,
            issued_at: record.issued_at,
        }))
    }

    async fn persist(&self, tokens: &TokenSet) -> Result<()> {
        let record = StoredTokenRecord {
            account: self.account.as_str().to_string(),
            sealed_access_token: encrypt(&self.seal_key, TOKEN_SALT, tokens.access_token.as_bytes())?,
            sealed_refresh_token: encrypt(
                &self.seal_key,
                TOKEN_SALT,
                tokens.refresh_token.as_bytes(),
            )?,
            expires_in: tokens.expires_in,
            token_type: tokens.token_type.clone(),
            issued_at: tokens.issued_at,
        };
        self.store.upsert(record).await
    }

    fn unseal(&self, sealed: &[u8]) -> Result<String> {
        let plaintext = decrypt(&self.seal_key, TOKEN_SALT, sealed)?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::Crypto("Unsealed token is not valid UTF-8".to_string()))
    }
}
