//! Call trace decoding and internal transaction classification.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Empty calldata as reported by the node.
const EMPTY_INPUT: &str = "0x";
const ZERO_VALUE: &str = "0x0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceType {
    Call,
    Create,
    Suicide,
    Reward,
    #[serde(other)]
    Other,
}

/// One call/create/suicide operation executed within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTrace {
    pub transaction_hash: String,
    pub trace_type: TraceType,
    pub from: Option<String>,
    pub to: Option<String>,
    pub call_type: Option<String>,
    pub value: Option<String>,
    pub input: Option<String>,
}

/// Trace as returned by `trace_filter` (parity format).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrace {
    action: Option<RawAction>,
    #[serde(rename = "type")]
    trace_type: Option<TraceType>,
    transaction_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    from: Option<String>,
    to: Option<String>,
    call_type: Option<String>,
    value: Option<String>,
    input: Option<String>,
}

impl CallTrace {
    fn from_raw(raw: RawTrace) -> Option<Self> {
        let action = raw.action?;
        Some(Self {
            transaction_hash: raw.transaction_hash.unwrap_or_default(),
            trace_type: raw.trace_type.unwrap_or(TraceType::Other),
            from: action.from,
            to: action.to,
            call_type: action.call_type,
            value: action.value,
            input: action.input,
        })
    }
}

/// Decodes a `trace_filter` result. `null` means no traces. Only a result that
/// is not an array fails; single traces that do not decode or carry no
/// `action` object are dropped.
pub fn decode_traces(result: Value) -> Result<Vec<CallTrace>, serde_json::Error> {
    if result.is_null() {
        return Ok(Vec::new());
    }

    let entries: Vec<Value> = serde_json::from_value(result)?;
    let traces = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawTrace>(entry) {
            Ok(raw) => CallTrace::from_raw(raw),
            Err(e) => {
                debug!("Skipping undecodable trace: {}", e);
                None
            }
        })
        .collect();

    Ok(traces)
}

fn same_address(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

/// Whether `trace` is an internal transaction involving `target`.
///
/// Only value- or data-bearing `call` traces where `target` is on exactly one
/// side of the call qualify.
pub fn classify(trace: &CallTrace, target: &str) -> bool {
    if trace.trace_type != TraceType::Call {
        return false;
    }

    let from = trace.from.as_deref();
    let to = trace.to.as_deref();

    let involves_target = same_address(to, Some(target)) || same_address(from, Some(target));
    if !involves_target || same_address(from, to) {
        return false;
    }

    let carries_value = trace.value.as_deref() != Some(ZERO_VALUE);
    let carries_data = matches!(trace.input.as_deref(), Some(input) if input != EMPTY_INPUT);

    carries_value || carries_data
}

/// Unique transaction hashes of internal transactions seen for one address.
#[derive(Debug, Clone)]
pub struct InternalTransactionSet {
    target: String,
    hashes: HashSet<String>,
}

impl InternalTransactionSet {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            hashes: HashSet::new(),
        }
    }

    /// Records `trace` if it classifies as relevant. Returns true when the
    /// trace matched, even if its transaction was already recorded.
    pub fn observe(&mut self, trace: &CallTrace) -> bool {
        if !classify(trace, &self.target) {
            return false;
        }
        self.hashes.insert(trace.transaction_hash.clone());
        true
    }

    #[cfg(test)]
    pub fn contains(&self, tx_hash: &str) -> bool {
        self.hashes.contains(tx_hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
