//! In-memory node double shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use super::rpc::{RpcCall, RpcError, RpcPayload};

type Handler = Box<dyn Fn(&RpcPayload) -> Result<Value, RpcError> + Send + Sync>;

/// Answers payloads through a closure and records every call it receives.
pub struct ScriptedRpc {
    handler: Handler,
    calls: Mutex<Vec<RpcPayload>>,
}

impl ScriptedRpc {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&RpcPayload) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RpcPayload> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.method == method)
            .count()
    }
}

#[async_trait]
impl RpcCall for ScriptedRpc {
    async fn call(&self, payload: RpcPayload) -> Result<Value, RpcError> {
        let result = (self.handler)(&payload);
        self.calls.lock().unwrap().push(payload);
        result
    }
}

/// Reads the hex `fromBlock`/`toBlock` of a `trace_filter` payload.
pub fn trace_filter_range(payload: &RpcPayload) -> (u64, u64) {
    let filter = &payload.params[0];
    let parse = |key: &str| {
        let hex = filter[key].as_str().unwrap();
        u64::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap()
    };
    (parse("fromBlock"), parse("toBlock"))
}
