//! Wired-together upstream access for one account.

use std::sync::Arc;

use ledgerbridge_common::Result;

use crate::config::NetSuiteConfig;
use crate::query::QueryClient;
use crate::records::ResourceClient;
use crate::secrets::SecretStore;
use crate::tokens::TokenManager;
use crate::transport::TransportClient;

/// One account's token manager, transport, and typed clients, constructed
/// as a unit.
///
/// There is no process-wide state here: build one client per account and
/// pass it where it is needed.
pub struct NetSuiteClient {
    config: NetSuiteConfig,
    tokens: Arc<TokenManager>,
    transport: Arc<TransportClient>,
    resources: ResourceClient,
    query: QueryClient,
}

impl NetSuiteClient {
    pub fn new(config: NetSuiteConfig, store: Arc<dyn SecretStore>) -> Result<Self> {
        let tokens = Arc::new(TokenManager::new(&config, store)?);
        let transport = Arc::new(TransportClient::new(&config, tokens.clone())?);
        let resources = ResourceClient::new(config.clone(), transport.clone());
        let query = QueryClient::new(config.clone(), transport.clone());
        Ok(Self {
            config,
            tokens,
            transport,
            resources,
            query,
        })
    }

    pub fn config(&self) -> &NetSuiteConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }

    pub fn resources(&self) -> &ResourceClient {
        &self.resources
    }

    pub fn query(&self) -> &QueryClient {
        &self.query
    }
}
