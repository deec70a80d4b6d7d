//! JSON-RPC transport for the archive node.
//!
//! [`RpcClient`] binds one endpoint at construction and exposes a single
//! [`RpcCall::call`] that takes a prepared [`RpcPayload`]. Every HTTP exchange
//! runs under the endpoint's [`RetryPolicy`].

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::retry::RetryPolicy;
use super::utils;

const JSONRPC_VERSION: &str = "2.0";
const REQUEST_ID: u64 = 1;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}")]
    Status { status: u16, body: String },

    #[error("JSON-RPC error: code={code}, message={message}")]
    JsonRpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Error body sent back by the node, if any.
    pub fn remote_body(&self) -> Option<String> {
        match self {
            RpcError::Status { body, .. } if !body.is_empty() => Some(body.clone()),
            RpcError::JsonRpc { data: Some(data), .. } => Some(data.to_string()),
            _ => None,
        }
    }
}

/// Endpoint an [`RpcClient`] is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpointConfig {
    pub url: String,
    pub retry: RetryPolicy,
}

impl RpcEndpointConfig {
    pub fn new(url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            retry,
        }
    }
}

/// JSON-RPC request envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcPayload {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcPayload {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: REQUEST_ID,
            method: method.into(),
            params,
        }
    }

    pub fn block_number() -> Self {
        Self::new("eth_blockNumber", vec![])
    }

    pub fn transaction_count(address: &str, block_tag: &str) -> Self {
        Self::new("eth_getTransactionCount", vec![json!(address), json!(block_tag)])
    }

    pub fn logs(filter: Value) -> Self {
        Self::new("eth_getLogs", vec![filter])
    }

    /// `trace_filter` over an inclusive block range, unrestricted by address.
    pub fn trace_filter(from_block: u64, to_block: u64, count: u64) -> Self {
        Self::new(
            "trace_filter",
            vec![json!({
                "fromBlock": utils::to_hex_quantity(from_block),
                "toBlock": utils::to_hex_quantity(to_block),
                "fromAddress": null,
                "toAddress": null,
                "after": 0,
                "count": count,
            })],
        )
    }

    pub fn transaction_receipt(tx_hash: &str) -> Self {
        Self::new("eth_getTransactionReceipt", vec![json!(tx_hash)])
    }

    pub fn block_by_hash(block_hash: &str, full_transactions: bool) -> Self {
        Self::new(
            "eth_getBlockByHash",
            vec![json!(block_hash), json!(full_transactions)],
        )
    }
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Something that can answer a JSON-RPC payload with its `result` value.
#[async_trait]
pub trait RpcCall: Send + Sync {
    async fn call(&self, payload: RpcPayload) -> Result<Value, RpcError>;
}

/// HTTP JSON-RPC client bound to a single endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: RpcEndpointConfig,
}

impl RpcClient {
    pub fn new(endpoint: RpcEndpointConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, endpoint })
    }

    #[cfg(test)]
    pub(crate) fn endpoint(&self) -> &RpcEndpointConfig {
        &self.endpoint
    }

    /// One HTTP round trip. Non-2xx statuses become [`RpcError::Status`].
    async fn send_once(&self, payload: &RpcPayload) -> Result<JsonRpcResponse, RpcError> {
        let response = self
            .http
            .post(&self.endpoint.url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RpcCall for RpcClient {
    async fn call(&self, payload: RpcPayload) -> Result<Value, RpcError> {
        let payload = &payload;
        let mut attempt: u32 = 0;

        let envelope = self
            .endpoint
            .retry
            .run(|| {
                attempt += 1;
                let attempt = attempt;
                async move {
                    let outcome = self.send_once(payload).await;
                    if let Err(e) = &outcome {
                        match e.remote_body() {
                            Some(body) => warn!(
                                "[attempt {}] RPC call {} failed: {}, details: {}",
                                attempt, payload.method, e, body
                            ),
                            None => warn!(
                                "[attempt {}] RPC call {} failed: {}",
                                attempt, payload.method, e
                            ),
                        }
                    }
                    outcome
                }
            })
            .await?;

        if let Some(error) = envelope.error {
            warn!(
                "RPC call {} returned error: code={}, message={}",
                payload.method, error.code, error.message
            );
            return Err(RpcError::JsonRpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        debug!("RPC call {} succeeded", payload.method);
        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

/// Latest block number reported by the node.
pub async fn block_number<C: RpcCall + ?Sized>(rpc: &C) -> Result<u64, RpcError> {
    let result = rpc.call(RpcPayload::block_number()).await?;
    decode_quantity(&result)
}

/// Decodes a hex quantity `result` value.
pub fn decode_quantity(result: &Value) -> Result<u64, RpcError> {
    let hex = result
        .as_str()
        .ok_or_else(|| RpcError::InvalidResponse(format!("expected hex quantity, got {}", result)))?;

    utils::parse_hex_quantity(hex).map_err(|e| RpcError::InvalidResponse(e.to_string()))
}
