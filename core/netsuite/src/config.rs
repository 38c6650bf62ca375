//! Connection configuration for one NetSuite account.

use serde::{Deserialize, Serialize};
use url::Url;

use ledgerbridge_common::{AccountId, Error, Result};

/// Default shared concurrency budget per account.
///
/// The upstream enforces one budget across every integration touching the
/// same account, so the default stays conservative.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 15;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// OAuth2 scope required for the REST record and query APIs.
pub const REST_SCOPE: &str = "rest_webservices";

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Everything needed to talk to one account: OAuth client credentials,
/// the token-sealing passphrase, and the transport budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetSuiteConfig {
    /// Account identifier, e.g. `1234567` or `1234567_SB1`.
    pub account_id: AccountId,
    /// OAuth2 client id of the integration record.
    pub client_id: String,
    /// OAuth2 client secret of the integration record.
    pub client_secret: String,
    /// Redirect URI registered with the integration.
    pub redirect_uri: String,
    /// Passphrase protecting stored tokens at rest.
    pub token_encryption_key: String,
    /// Maximum in-flight upstream requests.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Override for the REST/token base URL (tests, proxies).
    #[serde(default)]
    pub rest_base_override: Option<String>,
    /// Override for the interactive authorization endpoint.
    #[serde(default)]
    pub authorize_endpoint_override: Option<String>,
}

impl NetSuiteConfig {
    /// Create a config with defaults for the tunable fields.
    ///
    /// # Errors
    /// - Returns error if any credential field is empty
    pub fn new(
        account_id: AccountId,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        token_encryption_key: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            account_id,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            token_encryption_key: token_encryption_key.into(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            rest_base_override: None,
            authorize_endpoint_override: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the concurrency limit.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Point the REST and token endpoints at a different base URL.
    pub fn with_rest_base(mut self, base: impl Into<String>) -> Self {
        self.rest_base_override = Some(base.into());
        self
    }

    /// Point the authorization endpoint at a different URL.
    pub fn with_authorize_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorize_endpoint_override = Some(endpoint.into());
        self
    }

    /// Check that every credential field is present.
    ///
    /// # Errors
    /// - Returns error naming the first empty field
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::Config("client_id cannot be empty".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(Error::Config("client_secret cannot be empty".to_string()));
        }
        if self.redirect_uri.is_empty() {
            return Err(Error::Config("redirect_uri cannot be empty".to_string()));
        }
        if self.token_encryption_key.is_empty() {
            return Err(Error::Config(
                "token_encryption_key cannot be empty".to_string(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(Error::Config(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON document.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)
            .map_err(|e| Error::Serialization(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a JSON document.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Base URL of the REST services host.
    pub fn rest_base(&self) -> String {
        match &self.rest_base_override {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.suitetalk.api.netsuite.com",
                self.account_id.domain_label()
            ),
        }
    }

    /// OAuth2 token endpoint (exchange and refresh grants).
    pub fn token_endpoint(&self) -> String {
        format!("{}/services/rest/auth/oauth2/v1/token", self.rest_base())
    }

    /// Interactive authorization endpoint.
    pub fn authorize_endpoint(&self) -> String {
        match &self.authorize_endpoint_override {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://{}.app.netsuite.com/app/login/oauth2/authorize.nl",
                self.account_id.domain_label()
            ),
        }
    }

    /// URL of a record collection or a single record.
    pub fn record_url(&self, record_type: &str, id: Option<&str>) -> Result<Url> {
        let mut raw = format!(
            "{}/services/rest/record/v1/{}",
            self.rest_base(),
            record_type
        );
        if let Some(id) = id {
            raw.push('/');
            raw.push_str(id);
        }
        Url::parse(&raw).map_err(|e| Error::InvalidInput(format!("Invalid record URL: {}", e)))
    }

    /// URL of the server-side record conversion endpoint.
    pub fn transform_url(
        &self,
        source_type: &str,
        source_id: &str,
        target_type: &str,
    ) -> Result<Url> {
        let raw = format!(
            "{}/services/rest/record/v1/{}/{}/!transform/{}",
            self.rest_base(),
            source_type,
            source_id,
            target_type
        );
        Url::parse(&raw).map_err(|e| Error::InvalidInput(format!("Invalid transform URL: {}", e)))
    }

    /// URL of the SuiteQL endpoint with pagination parameters.
    ///
    /// The query API paginates through URL parameters, not SQL clauses.
    pub fn suiteql_url(&self, limit: u32, offset: u32) -> Result<Url> {
        let raw = format!(
            "{}/services/rest/query/v1/suiteql?limit={}&offset={}",
            self.rest_base(),
            limit,
            offset
        );
        Url::parse(&raw).map_err(|e| Error::InvalidInput(format!("Invalid query URL: {}", e)))
    }

    /// Per-request timeout as a Duration.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NetSuiteConfig {
        NetSuiteConfig::new(
            AccountId::new("1234567_SB1").unwrap(),
            "client-id",
            "client-secret",
            "https://localhost/callback",
            "seal-key",
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = test_config();
        assert_eq!(config.concurrency_limit, DEFAULT_CONCURRENCY_LIMIT);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_domain_label_in_urls() {
        let config = test_config();
        assert_eq!(
            config.rest_base(),
            "https://1234567-sb1.suitetalk.api.netsuite.com"
        );
        assert!(config
            .authorize_endpoint()
            .starts_with("https://1234567-sb1.app.netsuite.com"));
    }

    #[test]
    fn test_record_url() {
        let config = test_config();
        let url = config.record_url("customer", Some("42")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://1234567-sb1.suitetalk.api.netsuite.com/services/rest/record/v1/customer/42"
        );

        let collection = config.record_url("customer", None).unwrap();
        assert!(collection.as_str().ends_with("/record/v1/customer"));
    }

    #[test]
    fn test_transform_url() {
        let config = test_config();
        let url = config
            .transform_url("salesorder", "7", "invoice")
            .unwrap();
        assert!(url
            .as_str()
            .ends_with("/record/v1/salesorder/7/!transform/invoice"));
    }

    #[test]
    fn test_suiteql_url_pagination_params() {
        let config = test_config();
        let url = config.suiteql_url(1000, 2000).unwrap();
        assert!(url.as_str().ends_with("/suiteql?limit=1000&offset=2000"));
    }

    #[test]
    fn test_rest_base_override() {
        let config = test_config().with_rest_base("http://127.0.0.1:9999/");
        assert_eq!(config.rest_base(), "http://127.0.0.1:9999");
        assert_eq!(
            config.token_endpoint(),
            "http://127.0.0.1:9999/services/rest/auth/oauth2/v1/token"
        );
    }

    #[test]
    fn test_validation_rejects_empty_fields() {
        let result = NetSuiteConfig::new(
            AccountId::new("1234567").unwrap(),
            "",
            "secret",
            "https://localhost/callback",
            "key",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = test_config().with_concurrency_limit(5);
        let json = config.to_json().unwrap();
        let parsed = NetSuiteConfig::from_json(&json).unwrap();

        assert_eq!(parsed.account_id, config.account_id);
        assert_eq!(parsed.concurrency_limit, 5);
    }

    #[test]
    fn test_json_defaults_for_missing_fields() {
        let json = r#"{
            "account_id": "1234567",
            "client_id": "cid",
            "client_secret": "cs",
            "redirect_uri": "https://localhost/callback",
            "token_encryption_key": "key"
        }"#;
        let config = NetSuiteConfig::from_json(json).unwrap();
        assert_eq!(config.concurrency_limit, DEFAULT_CONCURRENCY_LIMIT);
        assert!(config.rest_base_override.is_none());
    }
}
