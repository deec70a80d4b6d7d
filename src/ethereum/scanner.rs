//! Windowed `trace_filter` scanning over large block ranges.
//!
//! Windows are contiguous, non-overlapping and inclusive, and are fetched one
//! after another in ascending order. Each window costs exactly one RPC call.

use thiserror::Error;
use tracing::{debug, info};

use super::rpc::{RpcCall, RpcError, RpcPayload};
use super::trace::{self, CallTrace, InternalTransactionSet};

/// Default `count` passed to `trace_filter` for a single window.
pub const DEFAULT_TRACE_PAGE_SIZE: u64 = 10_000;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Window size must be greater than zero")]
    InvalidWindowSize,

    #[error("Trace query for blocks {window} failed: {source}")]
    Rpc {
        window: BlockWindow,
        #[source]
        source: RpcError,
    },

    #[error("Malformed traces for blocks {window}: {source}")]
    Decode {
        window: BlockWindow,
        #[source]
        source: serde_json::Error,
    },
}

/// Inclusive block range covered by one trace query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from: u64,
    pub to: u64,
}

impl BlockWindow {
    #[cfg(test)]
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }
}

impl std::fmt::Display for BlockWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Ascending windows over `[from, to]`; the last one may be shorter.
#[derive(Debug, Clone)]
pub struct BlockWindows {
    next: Option<u64>,
    end: u64,
    size: u64,
}

impl BlockWindows {
    pub fn new(from: u64, to: u64, size: u64) -> Result<Self, ScanError> {
        if size == 0 {
            return Err(ScanError::InvalidWindowSize);
        }

        Ok(Self {
            next: (from <= to).then_some(from),
            end: to,
            size,
        })
    }
}

impl Iterator for BlockWindows {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<BlockWindow> {
        let from = self.next?;
        let to = from.saturating_add(self.size - 1).min(self.end);

        self.next = if to >= self.end { None } else { Some(to + 1) };
        Some(BlockWindow { from, to })
    }
}

/// Lazily pages traces out of the node one window at a time.
pub struct BatchScanner<'a, C: ?Sized> {
    rpc: &'a C,
    windows: BlockWindows,
    page_size: u64,
    failed: bool,
}

impl<'a, C: RpcCall + ?Sized> BatchScanner<'a, C> {
    pub fn new(rpc: &'a C, from: u64, to: u64, window_size: u64) -> Result<Self, ScanError> {
        Ok(Self {
            rpc,
            windows: BlockWindows::new(from, to, window_size)?,
            page_size: DEFAULT_TRACE_PAGE_SIZE,
            failed: false,
        })
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Fetches the next window. Returns `None` once the range is exhausted or
    /// after the first error.
    pub async fn next_window(&mut self) -> Option<Result<(BlockWindow, Vec<CallTrace>), ScanError>> {
        if self.failed {
            return None;
        }
        let window = self.windows.next()?;

        debug!("Processing blocks {} to {}...", window.from, window.to);

        let payload = RpcPayload::trace_filter(window.from, window.to, self.page_size);
        let outcome = match self.rpc.call(payload).await {
            Ok(result) => trace::decode_traces(result)
                .map(|traces| (window, traces))
                .map_err(|source| ScanError::Decode { window, source }),
            Err(source) => Err(ScanError::Rpc { window, source }),
        };

        self.failed = outcome.is_err();
        Some(outcome)
    }
}

/// Scans `[from, to]` and collects the unique internal transactions of `target`.
pub async fn collect_internal_transactions<C: RpcCall + ?Sized>(
    rpc: &C,
    target: &str,
    from: u64,
    to: u64,
    window_size: u64,
    page_size: u64,
) -> Result<InternalTransactionSet, ScanError> {
    let mut scanner = BatchScanner::new(rpc, from, to, window_size)?.with_page_size(page_size);
    let mut internal = InternalTransactionSet::new(target);

    while let Some(window) = scanner.next_window().await {
        let (window, traces) = window?;
        for trace in &traces {
            debug!(
                "Processing trace: hash={} type={:?} from={:?} to={:?} value={:?}",
                trace.transaction_hash, trace.trace_type, trace.from, trace.to, trace.value
            );
            if internal.observe(trace) {
                debug!("Found internal transaction: {}", trace.transaction_hash);
            }
        }
        debug!(
            "Blocks {} done: {} traces, {} unique internal transactions so far",
            window,
            traces.len(),
            internal.len()
        );
    }

    info!(
        "Found {} internal transactions for {} in blocks {} to {}",
        internal.len(),
        target,
        from,
        to
    );
    Ok(internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::testing::{trace_filter_range, ScriptedRpc};
    use serde_json::{json, Value};

    const TARGET: &str = "0x8101f23df6f9912f158d0383ad6904c774bea7e0";
    const OTHER: &str = "0x742d35cc6435c9c1c72c5e7b18bab7e1db7a5d6e";

    fn windows(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
        BlockWindows::new(from, to, size)
            .unwrap()
            .map(|w| (w.from, w.to))
            .collect()
    }

    fn trace_at(block: u64, hash: &str, from: &str, to: &str, value: &str) -> Value {
        json!({
            "action": {"callType": "call", "from": from, "to": to, "value": value, "input": "0x"},
            "blockNumber": block,
            "transactionHash": hash,
            "type": "call"
        })
    }

    /// Node that answers `trace_filter` from a fixed set of traces.
    fn chain(traces: Vec<Value>) -> ScriptedRpc {
        ScriptedRpc::new(move |payload| {
            let (from, to) = trace_filter_range(payload);
            let hits: Vec<Value> = traces
                .iter()
                .filter(|t| (from..=to).contains(&t["blockNumber"].as_u64().unwrap()))
                .cloned()
                .collect();
            if hits.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Array(hits))
            }
        })
    }

    fn sample_chain() -> Vec<Value> {
        vec![
            trace_at(100, "0xa", OTHER, TARGET, "0x1"),
            trace_at(100, "0xa", TARGET, OTHER, "0x5"),
            trace_at(104, "0xb", TARGET, OTHER, "0x2"),
            trace_at(107, "0xc", TARGET, TARGET, "0x2"),
            trace_at(109, "0xd", OTHER, TARGET, "0x0"),
            trace_at(110, "0xe", OTHER, TARGET, "0x3"),
            trace_at(115, "0xf", OTHER, OTHER, "0x3"),
        ]
    }

    #[test]
    fn test_windows_cover_range_without_overlap() {
        assert_eq!(windows(10, 19, 5), vec![(10, 14), (15, 19)]);
        assert_eq!(windows(10, 21, 5), vec![(10, 14), (15, 19), (20, 21)]);
        assert_eq!(windows(10, 10, 100), vec![(10, 10)]);
        assert_eq!(windows(0, 2, 1), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_empty_and_invalid_ranges() {
        assert!(windows(20, 10, 5).is_empty());
        assert!(matches!(
            BlockWindows::new(0, 10, 0),
            Err(ScanError::InvalidWindowSize)
        ));
    }

    #[test]
    fn test_windows_near_u64_max() {
        let w = windows(u64::MAX - 3, u64::MAX, 3);
        assert_eq!(w, vec![(u64::MAX - 3, u64::MAX - 1), (u64::MAX, u64::MAX)]);
    }

    #[tokio::test]
    async fn test_one_call_per_window() {
        let rpc = chain(sample_chain());
        let set = collect_internal_transactions(&rpc, TARGET, 100, 119, 10, 50)
            .await
            .unwrap();

        assert_eq!(rpc.call_count("trace_filter"), 2);
        let calls = rpc.calls();
        assert_eq!(trace_filter_range(&calls[0]), (100, 109));
        assert_eq!(trace_filter_range(&calls[1]), (110, 119));
        assert_eq!(calls[0].params[0]["count"], 50);
        assert_eq!(set.len(), 3);
    }

    #[tokio::test]
    async fn test_internal_count_is_window_size_invariant() {
        let rpc = chain(sample_chain());
        let mut counts = Vec::new();
        for size in [1, 3, 7, 20, 1000] {
            let set = collect_internal_transactions(&rpc, TARGET, 95, 120, size, 10_000)
                .await
                .unwrap();
            counts.push(set.len());
        }

        // 0xa (deduplicated), 0xb, 0xe
        assert!(counts.iter().all(|c| *c == 3), "counts differ: {counts:?}");
    }

    #[tokio::test]
    async fn test_null_windows_are_not_errors() {
        let rpc = ScriptedRpc::new(|_| Ok(Value::Null));
        let set = collect_internal_transactions(&rpc, TARGET, 0, 49, 10, 100)
            .await
            .unwrap();

        assert!(set.is_empty());
        assert_eq!(rpc.call_count("trace_filter"), 5);
    }

    #[tokio::test]
    async fn test_first_failing_window_stops_scan() {
        let rpc = ScriptedRpc::new(|payload| {
            let (from, _) = trace_filter_range(payload);
            if from >= 20 {
                Err(RpcError::InvalidResponse("node overloaded".into()))
            } else {
                Ok(json!([]))
            }
        });

        let err = collect_internal_transactions(&rpc, TARGET, 0, 99, 10, 100)
            .await
            .unwrap_err();

        match err {
            ScanError::Rpc { window, .. } => assert_eq!(window, BlockWindow { from: 20, to: 29 }),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(rpc.call_count("trace_filter"), 3);
    }

    #[tokio::test]
    async fn test_scanner_is_lazy() {
        let rpc = ScriptedRpc::new(|_| Ok(json!([])));
        let mut scanner = BatchScanner::new(&rpc, 0, 99, 10).unwrap();

        let (window, traces) = scanner.next_window().await.unwrap().unwrap();
        assert_eq!(window, BlockWindow { from: 0, to: 9 });
        assert_eq!(window.len(), 10);
        assert!(traces.is_empty());
        assert_eq!(rpc.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_one_bad_trace_does_not_fail_window() {
        let rpc = ScriptedRpc::new(|_| {
            Ok(json!([
                {"action": {"from": OTHER, "to": TARGET, "value": 7}, "transactionHash": "0x1", "type": "call"},
                trace_at(3, "0x2", OTHER, TARGET, "0x1"),
            ]))
        });

        let set = collect_internal_transactions(&rpc, TARGET, 0, 9, 10, 100)
            .await
            .unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("0x2"));
    }

    #[tokio::test]
    async fn test_malformed_window_is_decode_error() {
        let rpc = ScriptedRpc::new(|_| Ok(json!({"unexpected": true})));
        let mut scanner = BatchScanner::new(&rpc, 0, 30, 10).unwrap();

        assert!(matches!(
            scanner.next_window().await,
            Some(Err(ScanError::Decode { .. }))
        ));
        assert!(scanner.next_window().await.is_none());
    }
}
