use anyhow::Result;
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    config::Config,
    ethereum::{
        block::{self, Block, BlockFetchError},
        clients::ClientManager,
        profile::{ProfileReport, TransactionProfileAggregator},
        rpc::{RpcCall, RpcPayload},
        utils,
    },
};

#[derive(Debug, Clone)]
pub struct ProfilerMcpServer {
    clients: Arc<ClientManager>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ProfileAddressRequest {
    address: String,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct FetchBlockRequest {
    block_hash: String,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct TransactionReceiptRequest {
    transaction_hash: String,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CheckConnectionRequest {
    network: Option<String>,
}

impl ProfilerMcpServer {
    pub fn new(config: Config) -> Result<Self> {
        let clients = Arc::new(ClientManager::new(config)?);
        Ok(Self { clients })
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting Archive Profiler MCP Server");

        let service = self.clone().serve(stdio()).await?;

        info!("Archive Profiler MCP Server started successfully");
        let _ = service.waiting().await;
        Ok(())
    }

    fn validate_network(&self, network: Option<&str>) -> Result<()> {
        if let Some(net) = network {
            utils::validate_network(net, &self.clients.get_available_networks())?;
        }
        Ok(())
    }

    pub async fn build_profile(
        &self,
        address: &str,
        network: Option<&str>,
    ) -> Result<ProfileReport> {
        let address = utils::validate_address(address)?;
        self.validate_network(network)?;

        let client = self.clients.get_client(network)?;
        let aggregator = TransactionProfileAggregator::new(client, self.clients.config().scan);

        Ok(aggregator
            .profile_with_diagnostics(&address.to_string())
            .await)
    }

    /// Fetches a block by hash. Unknown networks are reported as configuration
    /// errors, like an empty hash or endpoint.
    pub async fn lookup_block(
        &self,
        block_hash: &str,
        network: Option<&str>,
    ) -> Result<Block, BlockFetchError> {
        let fetch_config = self
            .validate_network(network)
            .and_then(|_| self.clients.block_request(network, block_hash))
            .map_err(|e| BlockFetchError::Config {
                message: e.to_string(),
            })?;

        block::fetch_block(&fetch_config).await
    }
}

#[tool(tool_box)]
impl ProfilerMcpServer {
    #[tool(
        description = "Count originating, internal and incoming transactions of an address using an archive node"
    )]
    async fn profile_address(&self, #[tool(aggr)] request: ProfileAddressRequest) -> String {
        match self
            .build_profile(&request.address, request.network.as_deref())
            .await
        {
            Ok(report) => serde_json::to_string_pretty(&report)
                .unwrap_or_else(|_| "Failed to serialize profile".to_string()),
            Err(e) => {
                error!("Failed to profile address: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Fetch a block with full transactions by its hash")]
    async fn fetch_block(&self, #[tool(aggr)] request: FetchBlockRequest) -> String {
        match self
            .lookup_block(&request.block_hash, request.network.as_deref())
            .await
        {
            Ok(block) => serde_json::to_string_pretty(&block)
                .unwrap_or_else(|_| "Failed to serialize block".to_string()),
            Err(e) => {
                error!("Failed to fetch block {}: {}", request.block_hash, e);
                serde_json::to_string_pretty(&e.report())
                    .unwrap_or_else(|_| format!("Error: {}", e))
            }
        }
    }

    #[tool(description = "Get the receipt of a transaction by its hash")]
    async fn get_transaction_receipt(
        &self,
        #[tool(aggr)] request: TransactionReceiptRequest,
    ) -> String {
        if let Err(e) = utils::validate_hash(&request.transaction_hash) {
            return format!("Error: {}", e);
        }
        if let Err(e) = self.validate_network(request.network.as_deref()) {
            return format!("Error: {}", e);
        }

        let client = match self.clients.get_client(request.network.as_deref()) {
            Ok(client) => client,
            Err(e) => return format!("Error: {}", e),
        };

        match client
            .call(RpcPayload::transaction_receipt(&request.transaction_hash))
            .await
        {
            Ok(receipt) if receipt.is_null() => {
                format!("No receipt found for {}", request.transaction_hash)
            }
            Ok(receipt) => serde_json::to_string_pretty(&receipt)
                .unwrap_or_else(|_| "Failed to serialize receipt".to_string()),
            Err(e) => {
                error!("Failed to get transaction receipt: {}", e);
                format!("Error: {}", utils::interpret_rpc_error(&e.to_string()))
            }
        }
    }

    #[tool(description = "Check that the archive node of a network is reachable")]
    async fn check_connection(&self, #[tool(aggr)] request: CheckConnectionRequest) -> String {
        match self
            .clients
            .check_connection(request.network.as_deref())
            .await
        {
            Ok(block_number) => format!("Connected, latest block: {}", block_number),
            Err(e) => format!("Error: {}", e),
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for ProfilerMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("MCP server for profiling Ethereum addresses against an archive node. Counts originating, internal (trace based) and incoming (log based) transactions, fetches blocks by hash and reads transaction receipts.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
