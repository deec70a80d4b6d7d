//! Per-address transaction profile built from three independent node queries.
//!
//! A failing query never fails the profile: its count becomes zero and the
//! failure is logged and reported next to the profile in [`ProfileReport`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, info};

use super::rpc::{self, RpcCall, RpcError, RpcPayload};
use super::scanner::{self, ScanError};
use super::utils;
use crate::config::ScanConfig;

#[derive(Error, Debug)]
pub enum SubQueryError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Sub-query task aborted: {0}")]
    Join(#[from] JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionProfile {
    pub address: String,
    pub originating_count: u64,
    pub internal_count: u64,
    pub incoming_count: u64,
    pub total_count: u64,
}

impl TransactionProfile {
    pub fn new(
        address: impl Into<String>,
        originating_count: u64,
        internal_count: u64,
        incoming_count: u64,
    ) -> Self {
        Self {
            address: address.into(),
            originating_count,
            internal_count,
            incoming_count,
            total_count: originating_count + internal_count + incoming_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubQuery {
    Originating,
    Internal,
    Incoming,
}

impl fmt::Display for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubQuery::Originating => "originating",
            SubQuery::Internal => "internal",
            SubQuery::Incoming => "incoming",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQueryFailure {
    pub query: SubQuery,
    pub message: String,
}

/// A profile plus the sub-queries whose count was zeroed because they failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub profile: TransactionProfile,
    pub failures: Vec<SubQueryFailure>,
}

impl ProfileReport {
    #[cfg(test)]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct TransactionProfileAggregator<C> {
    rpc: Arc<C>,
    scan: ScanConfig,
}

impl<C: RpcCall + 'static> TransactionProfileAggregator<C> {
    pub fn new(rpc: Arc<C>, scan: ScanConfig) -> Self {
        Self { rpc, scan }
    }

    #[allow(dead_code)]
    pub async fn profile(&self, address: &str) -> TransactionProfile {
        self.profile_with_diagnostics(address).await.profile
    }

    pub async fn profile_with_diagnostics(&self, address: &str) -> ProfileReport {
        info!("Analyzing transactions for address: {}", address);

        let originating = tokio::spawn(originating_count(
            Arc::clone(&self.rpc),
            address.to_string(),
        ));
        let internal = tokio::spawn(internal_count(
            Arc::clone(&self.rpc),
            address.to_string(),
            self.scan,
        ));
        let incoming = tokio::spawn(incoming_count(
            Arc::clone(&self.rpc),
            address.to_string(),
            self.scan.log_start_block,
        ));

        let (originating, internal, incoming) = tokio::join!(originating, internal, incoming);

        let mut failures = Vec::new();
        let originating = settle(SubQuery::Originating, address, originating, &mut failures);
        let internal = settle(SubQuery::Internal, address, internal, &mut failures);
        let incoming = settle(SubQuery::Incoming, address, incoming, &mut failures);

        let profile = TransactionProfile::new(address, originating, internal, incoming);
        info!(
            "Profile for {}: {} originating, {} internal, {} incoming, {} total",
            address,
            profile.originating_count,
            profile.internal_count,
            profile.incoming_count,
            profile.total_count
        );

        ProfileReport { profile, failures }
    }
}

/// Collapses a joined sub-query into its count, recording the failure if any.
fn settle(
    query: SubQuery,
    address: &str,
    joined: Result<Result<u64, SubQueryError>, JoinError>,
    failures: &mut Vec<SubQueryFailure>,
) -> u64 {
    let outcome = joined.map_err(SubQueryError::from).and_then(|r| r);
    match outcome {
        Ok(count) => count,
        Err(e) => {
            error!("Error in {} sub-query for {}: {}", query, address, e);
            let rpc_error = match &e {
                SubQueryError::Rpc(source) | SubQueryError::Scan(ScanError::Rpc { source, .. }) => {
                    Some(source)
                }
                _ => None,
            };
            if let Some(body) = rpc_error.and_then(RpcError::remote_body) {
                error!("Error details: {}", body);
            }
            failures.push(SubQueryFailure {
                query,
                message: e.to_string(),
            });
            0
        }
    }
}

async fn originating_count<C: RpcCall + ?Sized>(
    rpc: Arc<C>,
    address: String,
) -> Result<u64, SubQueryError> {
    let result = rpc
        .call(RpcPayload::transaction_count(&address, "latest"))
        .await?;
    let count = rpc::decode_quantity(&result)?;

    info!("Found {} originating transactions", count);
    Ok(count)
}

async fn internal_count<C: RpcCall + ?Sized>(
    rpc: Arc<C>,
    address: String,
    scan: ScanConfig,
) -> Result<u64, SubQueryError> {
    let latest = rpc::block_number(rpc.as_ref()).await?;
    info!("Latest block: {}", latest);

    let internal = scanner::collect_internal_transactions(
        rpc.as_ref(),
        &address,
        scan.trace_start_block,
        latest,
        scan.window_size,
        scan.trace_page_size,
    )
    .await?;

    Ok(internal.len() as u64)
}

async fn incoming_count<C: RpcCall + ?Sized>(
    rpc: Arc<C>,
    address: String,
    from_block: u64,
) -> Result<u64, SubQueryError> {
    let filter = json!({
        "fromBlock": utils::to_hex_quantity(from_block),
        "toBlock": "latest",
        "address": address,
        "topics": [],
    });

    let logs = match rpc.call(RpcPayload::logs(filter)).await? {
        Value::Null => Vec::new(),
        Value::Array(logs) => logs,
        other => {
            return Err(RpcError::InvalidResponse(format!(
                "expected log array, got {}",
                other
            ))
            .into())
        }
    };

    // the node already filters by address, re-check anyway
    let count = logs
        .iter()
        .filter(|log| {
            log["address"]
                .as_str()
                .is_some_and(|emitter| emitter.eq_ignore_ascii_case(&address))
        })
        .count() as u64;

    info!("Found {} incoming transactions", count);
    Ok(count)
}
