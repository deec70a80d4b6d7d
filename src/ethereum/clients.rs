use crate::config::{Config, NetworkConfig};
use crate::ethereum::block::BlockFetchConfig;
use crate::ethereum::rpc::{self, RpcClient, RpcEndpointConfig};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// One shared [`RpcClient`] per configured network.
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<String, Arc<RpcClient>>,
    config: Config,
}

impl ClientManager {
    pub fn new(config: Config) -> Result<Self> {
        let mut clients = HashMap::new();

        for (network_name, network_config) in &config.networks {
            let client = Self::create_client(network_config, &config)?;
            clients.insert(network_name.clone(), Arc::new(client));
        }

        Ok(Self { clients, config })
    }

    fn create_client(network_config: &NetworkConfig, config: &Config) -> Result<RpcClient> {
        let endpoint = RpcEndpointConfig::new(network_config.rpc_url.clone(), config.retry);
        RpcClient::new(endpoint).map_err(|e| anyhow!("Failed to build RPC client: {}", e))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get_client(&self, network: Option<&str>) -> Result<Arc<RpcClient>> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.clients
            .get(network_name)
            .cloned()
            .ok_or_else(|| anyhow!("Network '{}' not found", network_name))
    }

    pub fn get_available_networks(&self) -> Vec<String> {
        let mut networks: Vec<String> = self.config.networks.keys().cloned().collect();
        networks.sort();
        networks
    }

    /// Block pipeline request for `block_hash` on the given network.
    pub fn block_request(&self, network: Option<&str>, block_hash: &str) -> Result<BlockFetchConfig> {
        let network_config = self.config.network(network)?;
        Ok(BlockFetchConfig::new(network_config.rpc_url.clone(), block_hash)
            .with_retry(self.config.retry))
    }

    pub async fn check_connection(&self, network: Option<&str>) -> Result<u64> {
        let network_name = network.unwrap_or(&self.config.default_network);
        let client = self
            .get_client(network)
            .map_err(|e| anyhow!("Network '{}' is not configured: {}", network_name, e))?;

        rpc::block_number(client.as_ref()).await.map_err(|e| {
            tracing::debug!("Connection check failed for network {}: {}", network_name, e);
            anyhow!(
                "Cannot connect to network '{}': {}. Please check your RPC endpoint configuration and network connectivity.",
                network_name,
                crate::ethereum::utils::interpret_rpc_error(&e.to_string())
            )
        })
    }
}
