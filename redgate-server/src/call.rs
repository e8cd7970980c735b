//! Inbound batch call with order-preserving reply buffering.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use redgate_batch::sink::ResponseSink;
use redgate_common::command::RedisCommand;
use redgate_common::error::RgError;
use redgate_common::metrics::LatencyHistogram;
use redgate_common::response::RedisResponse;

/// Final per-index verdict delivered to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReply {
    /// Backend- or dispatcher-produced response.
    Success(RedisResponse),
    /// Per-index failure.
    Failure(RgError),
}

#[derive(Debug)]
struct CallState {
    replies: Vec<Option<CallReply>>,
    remaining: usize,
}

/// One inbound call carrying a parsed batch.
///
/// Backend completions respond out of index order and from callback threads; replies are
/// buffered per index so the wire encoder can emit them in original batch order. Every index is
/// responded to exactly once; a second response for an index is a scheduler bug, logged and
/// dropped (the first response wins).
#[derive(Debug)]
pub struct InboundCall {
    batch: Vec<RedisCommand>,
    received_at: Instant,
    state: Mutex<CallState>,
    completed: Condvar,
}

impl InboundCall {
    /// Wraps one parsed batch.
    #[must_use]
    pub fn new(batch: Vec<RedisCommand>) -> Arc<Self> {
        let remaining = batch.len();
        Arc::new(Self {
            batch,
            received_at: Instant::now(),
            state: Mutex::new(CallState {
                replies: (0..remaining).map(|_| None).collect(),
                remaining,
            }),
            completed: Condvar::new(),
        })
    }

    /// The parsed commands of this batch, in wire order.
    #[must_use]
    pub fn client_batch(&self) -> &[RedisCommand] {
        &self.batch
    }

    /// One command by batch index.
    #[must_use]
    pub fn command(&self, index: usize) -> Option<&RedisCommand> {
        self.batch.get(index)
    }

    /// Microseconds since this call was received.
    #[must_use]
    pub fn elapsed_micros(&self) -> u64 {
        u64::try_from(self.received_at.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Blocks until every index has responded, or the timeout elapses.
    ///
    /// Returns whether the batch completed.
    #[must_use]
    pub fn wait_complete(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while state.remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .completed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state = next;
        }
        true
    }

    /// Current per-index replies; unresponded slots are `None`.
    #[must_use]
    pub fn replies(&self) -> Vec<Option<CallReply>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replies
            .clone()
    }

    fn record(&self, index: usize, reply: CallReply) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(slot) = state.replies.get_mut(index) else {
            tracing::error!(index, "response index is out of batch range");
            debug_assert!(false, "response index must be inside the batch");
            return;
        };
        if slot.is_some() {
            tracing::error!(index, "batch index was responded to twice");
            debug_assert!(false, "each batch index must be responded to exactly once");
            return;
        }
        *slot = Some(reply);
        state.remaining -= 1;
        if state.remaining == 0 {
            drop(state);
            self.completed.notify_all();
        }
    }
}

impl ResponseSink for InboundCall {
    fn respond_success(
        &self,
        index: usize,
        response: RedisResponse,
        latency: &Arc<LatencyHistogram>,
    ) {
        latency.record_micros(self.elapsed_micros());
        self.record(index, CallReply::Success(response));
    }

    fn respond_failure(&self, index: usize, error: RgError) {
        self.record(index, CallReply::Failure(error));
    }
}

#[cfg(test)]
mod tests {
    use super::{CallReply, InboundCall};
    use googletest::prelude::*;
    use redgate_batch::sink::ResponseSink;
    use redgate_common::command::RedisCommand;
    use redgate_common::error::RgError;
    use redgate_common::metrics::MetricsRegistry;
    use redgate_common::response::RedisResponse;
    use rstest::rstest;
    use std::time::Duration;

    fn batch(names: &[&str]) -> Vec<RedisCommand> {
        names
            .iter()
            .map(|name| RedisCommand::from_tokens(&[name, "k"]))
            .collect()
    }

    #[rstest]
    fn empty_batch_is_complete_immediately() {
        let call = InboundCall::new(Vec::new());
        assert_that!(call.wait_complete(Duration::from_millis(1)), eq(true));
        assert_that!(call.replies().is_empty(), eq(true));
    }

    #[rstest]
    fn out_of_order_responses_land_at_their_indices() {
        let metrics = MetricsRegistry::new();
        let latency = metrics.latency_histogram("command");
        let call = InboundCall::new(batch(&["get", "get", "get"]));

        call.respond_success(2, RedisResponse::Integer(2), &latency);
        call.respond_failure(0, RgError::Request("get: Unsupported call.".to_owned()));
        assert_that!(call.wait_complete(Duration::from_millis(1)), eq(false));
        call.respond_success(1, RedisResponse::Null, &latency);

        assert_that!(call.wait_complete(Duration::from_secs(1)), eq(true));
        assert_that!(
            &call.replies(),
            eq(&vec![
                Some(CallReply::Failure(RgError::Request(
                    "get: Unsupported call.".to_owned()
                ))),
                Some(CallReply::Success(RedisResponse::Null)),
                Some(CallReply::Success(RedisResponse::Integer(2))),
            ])
        );
        assert_that!(latency.snapshot().count, eq(2_u64));
    }

    #[rstest]
    #[should_panic(expected = "exactly once")]
    fn double_response_for_one_index_is_a_bug() {
        let metrics = MetricsRegistry::new();
        let latency = metrics.latency_histogram("command");
        let call = InboundCall::new(batch(&["get"]));
        call.respond_success(0, RedisResponse::Null, &latency);
        call.respond_success(0, RedisResponse::Null, &latency);
    }
}
