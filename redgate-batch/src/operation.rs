//! One scheduled backend operation and its response slot binding.

use std::sync::Arc;

use redgate_client::ops::BackendOp;
use redgate_client::session::Session;
use redgate_common::error::RgResult;
use redgate_common::metrics::LatencyHistogram;
use redgate_common::response::RedisResponse;

/// One batch-indexed backend operation owned by a block.
///
/// The index identifies the response slot of the originating command and never changes after
/// construction; responses are routed by it regardless of backend completion order.
#[derive(Debug, Clone)]
pub struct Operation {
    index: usize,
    op: Arc<BackendOp>,
    latency: Arc<LatencyHistogram>,
}

impl Operation {
    /// Binds one backend op to its batch index and command latency handle.
    #[must_use]
    pub fn new(index: usize, op: Arc<BackendOp>, latency: Arc<LatencyHistogram>) -> Self {
        Self { index, op, latency }
    }

    /// Batch position of the originating command.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns whether this operation rides a read-typed session.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.op.is_read()
    }

    /// Latency histogram of the originating command.
    #[must_use]
    pub fn latency(&self) -> &Arc<LatencyHistogram> {
        &self.latency
    }

    /// Hands the payload to the session for deferred execution.
    ///
    /// # Errors
    ///
    /// Returns the session's synchronous rejection; the operation is then dropped from its
    /// block while the remaining operations proceed.
    pub fn apply(&self, session: &dyn Session) -> RgResult<()> {
        session.apply(Arc::clone(&self.op))
    }

    /// Backend-populated response after a successful flush.
    ///
    /// An unpopulated slot after a successful flush is a backend bug; it degrades into a
    /// command-level error response instead of poisoning the whole batch.
    #[must_use]
    pub fn response(&self) -> RedisResponse {
        match self.op.response() {
            Some(response) => response.clone(),
            None => {
                tracing::error!(index = self.index, "backend left a response slot unpopulated");
                RedisResponse::Error("Response was not populated by the backend.".to_owned())
            }
        }
    }
}
