//! Per-index response contract towards the inbound call.

use std::sync::Arc;

use redgate_common::error::RgError;
use redgate_common::metrics::LatencyHistogram;
use redgate_common::response::RedisResponse;

/// Response routing back to the inbound call.
///
/// Methods may be invoked out of index order and from backend callback threads; the
/// implementation buffers per-index replies so the wire reply preserves original batch order.
/// Scheduler invariants guarantee at most one call per index across the batch lifetime.
pub trait ResponseSink: Send + Sync {
    /// Delivers the response for the command at `index` and records its latency.
    fn respond_success(&self, index: usize, response: RedisResponse, latency: &Arc<LatencyHistogram>);

    /// Delivers a failure for the command at `index`.
    fn respond_failure(&self, index: usize, error: RgError);
}
