//! Single block fetch: validate the request, issue one `eth_getBlockByHash`,
//! then extract the block from the result.
//!
//! Each step returns a [`BlockFetchError`] on failure and later steps do not
//! run. The first failure reaches the caller exactly as produced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use super::retry::RetryPolicy;
use super::rpc::{RpcCall, RpcClient, RpcEndpointConfig, RpcError, RpcPayload};

/// Block as returned by the node. `hash` is `None` only when the node omitted
/// the field; an explicit `null` hash never makes it out of [`extract_block`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFetchConfig {
    pub rpc_url: String,
    pub block_hash: String,
    pub retry: RetryPolicy,
}

impl BlockFetchConfig {
    pub fn new(rpc_url: impl Into<String>, block_hash: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            block_hash: block_hash.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    ConfigPending,
    RequestPending,
    ExtractPending,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigError,
    RpcError,
    DataError,
    BlockError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Error, Debug)]
pub enum BlockFetchError {
    #[error("{message}")]
    Config { message: String },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("{message}")]
    Data {
        message: String,
        cause: Option<String>,
    },

    #[error("{message}")]
    Block { message: String },
}

/// Serializable view of a [`BlockFetchError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl BlockFetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlockFetchError::Config { .. } => ErrorKind::ConfigError,
            BlockFetchError::Rpc(_) => ErrorKind::RpcError,
            BlockFetchError::Data { .. } => ErrorKind::DataError,
            BlockFetchError::Block { .. } => ErrorKind::BlockError,
        }
    }

    /// Stage the pipeline was in when this error stopped it.
    pub fn stage(&self) -> FetchStage {
        match self {
            BlockFetchError::Config { .. } => FetchStage::ConfigPending,
            BlockFetchError::Rpc(_) => FetchStage::RequestPending,
            BlockFetchError::Data { .. } | BlockFetchError::Block { .. } => {
                FetchStage::ExtractPending
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        let cause = match self {
            BlockFetchError::Rpc(e) => e.remote_body(),
            BlockFetchError::Data { cause, .. } => cause.clone(),
            _ => None,
        };
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            cause,
        }
    }
}

/// Checks that both the endpoint and the block hash are present.
pub fn validate_config(config: &BlockFetchConfig) -> Result<RpcEndpointConfig, BlockFetchError> {
    if config.rpc_url.is_empty() || config.block_hash.is_empty() {
        return Err(BlockFetchError::Config {
            message: "Invalid configuration".to_string(),
        });
    }

    Ok(RpcEndpointConfig::new(config.rpc_url.clone(), config.retry))
}

pub async fn request_block<C: RpcCall + ?Sized>(
    rpc: &C,
    block_hash: &str,
) -> Result<Value, BlockFetchError> {
    Ok(rpc.call(RpcPayload::block_by_hash(block_hash, true)).await?)
}

pub fn extract_block(result: Value) -> Result<Block, BlockFetchError> {
    if result.is_null() {
        return Err(BlockFetchError::Data {
            message: "Invalid response data".to_string(),
            cause: None,
        });
    }

    // only an explicit null hash marks a missing block
    if result.get("hash").is_some_and(Value::is_null) {
        return Err(BlockFetchError::Block {
            message: "Block not found".to_string(),
        });
    }

    let block: Block = serde_json::from_value(result).map_err(|e| BlockFetchError::Data {
        message: "Invalid response data".to_string(),
        cause: Some(e.to_string()),
    })?;

    Ok(block)
}

/// Runs the pipeline against a freshly built [`RpcClient`].
pub async fn fetch_block(config: &BlockFetchConfig) -> Result<Block, BlockFetchError> {
    fetch_block_with(config, RpcClient::new).await
}

/// Runs the pipeline with a caller supplied transport. `connect` is only
/// invoked once the configuration is valid.
pub async fn fetch_block_with<C, F>(
    config: &BlockFetchConfig,
    connect: F,
) -> Result<Block, BlockFetchError>
where
    C: RpcCall,
    F: FnOnce(RpcEndpointConfig) -> Result<C, RpcError>,
{
    let outcome = run_stages(config, connect).await;
    match &outcome {
        Ok(_) => debug!("Block fetch {:?}: {}", FetchStage::Done, config.block_hash),
        Err(e) => debug!(
            "Block fetch {:?} during {:?}: {} ({})",
            FetchStage::Failed,
            e.stage(),
            e.kind(),
            e
        ),
    }
    outcome
}

async fn run_stages<C, F>(config: &BlockFetchConfig, connect: F) -> Result<Block, BlockFetchError>
where
    C: RpcCall,
    F: FnOnce(RpcEndpointConfig) -> Result<C, RpcError>,
{
    debug!("Block fetch {:?}", FetchStage::ConfigPending);
    let endpoint = validate_config(config)?;

    debug!("Block fetch {:?}", FetchStage::RequestPending);
    let rpc = connect(endpoint)?;
    let result = request_block(&rpc, &config.block_hash).await?;

    debug!("Block fetch {:?}", FetchStage::ExtractPending);
    extract_block(result)
}
