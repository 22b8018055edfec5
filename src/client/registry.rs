//! Config-backed server registry and client factory

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ArrClient, ClientError, ClientFactory, MediaServerClient, ServerRegistry};
use crate::config::{ClientConfig, Config, ServerConfig};
use crate::models::{ServerId, ServerRef};

/// Serves the `[[servers]]` section of a loaded [`Config`]
///
/// Clients are built lazily and cached per server id so a server's search
/// rate limiter is shared across cycles.
pub struct ConfigServerRegistry {
    servers: Vec<ServerConfig>,
    settings: ClientConfig,
    searches_per_second: u32,
    clients: Mutex<HashMap<ServerId, Arc<ArrClient>>>,
}

impl ConfigServerRegistry {
    pub fn new(
        servers: Vec<ServerConfig>,
        settings: ClientConfig,
        searches_per_second: u32,
    ) -> Self {
        Self {
            servers,
            settings,
            searches_per_second,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.servers.clone(),
            config.client.clone(),
            config.automation.searches_per_second,
        )
    }

    /// All configured servers, enabled or not
    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }
}

impl ServerRegistry for ConfigServerRegistry {
    fn list_enabled_servers(&self) -> Vec<ServerRef> {
        let mut servers: Vec<ServerRef> = self
            .servers
            .iter()
            .filter(|s| s.enabled)
            .map(ServerConfig::server_ref)
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        servers
    }
}

impl ClientFactory for ConfigServerRegistry {
    fn client_for(&self, server: &ServerRef) -> Result<Arc<dyn MediaServerClient>, ClientError> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(client) = clients.get(&server.id) {
            return Ok(client.clone());
        }

        let config = self
            .servers
            .iter()
            .find(|s| s.id == server.id)
            .ok_or(ClientError::UnknownServer(server.id))?;

        let client = Arc::new(ArrClient::new(
            config.server_ref(),
            &config.url,
            config.api_key.clone(),
            &self.settings,
            self.searches_per_second,
        )?);
        clients.insert(server.id, client.clone());

        tracing::debug!(server = %config.name, url = %config.url, "Created media server client");
        Ok(client)
    }
}
