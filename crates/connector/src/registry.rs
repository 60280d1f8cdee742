//! Process-wide table of live connectors, keyed by account id.

use std::{collections::HashMap, sync::Arc};

use {
    thiserror::Error,
    tokio::sync::Mutex,
    tracing::{info, warn},
};

use {
    haggler_auth::{CredentialError, CredentialStore, TokenEndpoint, TokenManager},
    haggler_common::{AccountId, OrderStatusSink, ReplyResolver},
};

use crate::{
    connector::{Connector, ConnectorSettings},
    state::ConnectorState,
    transport::GatewayTransport,
};

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Owns the account → connector map and the collaborators every connector
/// shares. Start and stop are serialized on one lock so two concurrent
/// `start` calls for the same account can never race a second session into
/// existence.
pub struct ConnectorRegistry {
    credentials: Arc<dyn CredentialStore>,
    transport: Arc<dyn GatewayTransport>,
    resolver: Arc<dyn ReplyResolver>,
    orders_sink: Arc<dyn OrderStatusSink>,
    endpoint: TokenEndpoint,
    settings: ConnectorSettings,
    http: reqwest::Client,
    connectors: Mutex<HashMap<AccountId, Arc<Connector>>>,
}

impl ConnectorRegistry {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        transport: Arc<dyn GatewayTransport>,
        resolver: Arc<dyn ReplyResolver>,
        orders_sink: Arc<dyn OrderStatusSink>,
        endpoint: TokenEndpoint,
        settings: ConnectorSettings,
    ) -> Self {
        Self {
            credentials,
            transport,
            resolver,
            orders_sink,
            endpoint,
            settings,
            http: reqwest::Client::new(),
            connectors: Mutex::new(HashMap::new()),
        }
    }

    /// Start a connector for the account, or hand back the running one.
    /// Fails fast when the stored credential is missing or carries no
    /// numeric identity.
    pub async fn start(&self, account_id: AccountId) -> Result<Arc<Connector>, StartError> {
        let mut connectors = self.connectors.lock().await;
        if let Some(existing) = connectors.get(&account_id) {
            info!(account_id, "connector already running");
            return Ok(Arc::clone(existing));
        }

        let credential = self.credentials.get(account_id).await?;
        let token = TokenManager::new(self.http.clone(), self.endpoint.clone(), credential)?;
        let connector = Arc::new(Connector::new(
            token,
            Arc::clone(&self.transport),
            Arc::clone(&self.resolver),
            Arc::clone(&self.orders_sink),
            self.settings.clone(),
        ));
        connector.start().await;
        connectors.insert(account_id, Arc::clone(&connector));
        info!(account_id, "connector started");
        Ok(connector)
    }

    /// Stop and forget the account's connector. Unknown ids are a no-op.
    pub async fn stop(&self, account_id: AccountId) {
        let mut connectors = self.connectors.lock().await;
        match connectors.remove(&account_id) {
            Some(connector) => connector.stop().await,
            None => warn!(account_id, "stop for an account with no connector"),
        }
    }

    pub async fn get(&self, account_id: AccountId) -> Option<Arc<Connector>> {
        self.connectors.lock().await.get(&account_id).cloned()
    }

    /// Lifecycle state per running account, for the status surface.
    pub async fn statuses(&self) -> Vec<(AccountId, ConnectorState)> {
        let connectors = self.connectors.lock().await;
        let mut out = Vec::with_capacity(connectors.len());
        for (id, connector) in connectors.iter() {
            out.push((*id, connector.state().await));
        }
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub async fn stop_all(&self) {
        let mut connectors = self.connectors.lock().await;
        for (account_id, connector) in connectors.drain() {
            info!(account_id, "stopping connector");
            connector.stop().await;
        }
    }
}
