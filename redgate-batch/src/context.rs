//! Per-call scheduling state: conflict detection and block placement.

use std::sync::Arc;

use redgate_client::client::BackendClient;
use redgate_client::ops::BackendOp;
use redgate_common::containers::HotSet;
use redgate_common::metrics::LatencyHistogram;

use crate::block::Block;
use crate::operation::Operation;
use crate::sink::ResponseSink;

/// Which kind led the most recent cross-kind phase flip.
///
/// `Unknown` keeps the parallel launch plan alive; once a flip happened, the direction is
/// decided and later conflicts only extend the existing chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConflictPhase {
    Unknown,
    Read,
    Write,
}

impl ConflictPhase {
    fn of(read: bool) -> Self {
        if read { Self::Read } else { Self::Write }
    }

    fn matches(self, read: bool) -> bool {
        self == Self::of(read)
    }

    fn is_unknown(self) -> bool {
        self == Self::Unknown
    }
}

#[derive(Default)]
struct BlockData {
    used_keys: HotSet<Vec<u8>>,
    block: Option<Arc<Block>>,
}

/// Scheduler state for one inbound batch.
///
/// Consecutive same-kind operations share one block to maximize backend batching. Opposite-kind
/// blocks run in parallel while their key footprints stay disjoint; the first cross-kind
/// conflict promotes the opposite block to the chain head and every further phase flip extends
/// the chain with a fresh block.
pub struct BatchContext {
    client: Arc<dyn BackendClient>,
    call: Arc<dyn ResponseSink>,
    latency_get_internal: Arc<LatencyHistogram>,
    latency_set_internal: Arc<LatencyHistogram>,
    timeout_millis: u64,
    read_data: BlockData,
    write_data: BlockData,
    flush_head: Option<Arc<Block>>,
    last_conflict_was_read: ConflictPhase,
}

impl BatchContext {
    /// Creates scheduler state bound to one call.
    #[must_use]
    pub fn new(
        client: Arc<dyn BackendClient>,
        call: Arc<dyn ResponseSink>,
        latency_get_internal: Arc<LatencyHistogram>,
        latency_set_internal: Arc<LatencyHistogram>,
        timeout_millis: u64,
    ) -> Self {
        Self {
            client,
            call,
            latency_get_internal,
            latency_set_internal,
            timeout_millis,
            read_data: BlockData::default(),
            write_data: BlockData::default(),
            flush_head: None,
            last_conflict_was_read: ConflictPhase::Unknown,
        }
    }

    /// Places one operation into a block, chaining blocks when its keys conflict with the
    /// opposite kind's accumulated footprint.
    pub fn apply(
        &mut self,
        index: usize,
        op: Arc<BackendOp>,
        latency: Arc<LatencyHistogram>,
        keys: Vec<Vec<u8>>,
    ) {
        let read = op.is_read();
        self.check_conflicts(read, &keys);

        if self.data(read).block.is_none() {
            let latency_internal = if read {
                Arc::clone(&self.latency_get_internal)
            } else {
                Arc::clone(&self.latency_set_internal)
            };
            let block = Arc::new(Block::new(
                Arc::clone(&self.call),
                latency_internal,
                self.timeout_millis,
            ));
            if self.last_conflict_was_read.matches(read) {
                // The current kind is the active chain tail; hook the fresh block behind the
                // opposite kind's open block.
                if let Some(opposite) = &self.data(!read).block {
                    let old_value = opposite.set_next(Arc::clone(&block));
                    if old_value.is_some() {
                        tracing::error!(index, "opposite block already had a successor");
                        debug_assert!(
                            old_value.is_none(),
                            "scheduler installed a second successor on one block"
                        );
                    }
                }
            }
            self.data_mut(read).block = Some(block);
        }

        if let Some(block) = &self.data(read).block {
            block.add_operation(Operation::new(index, op, latency));
        }
        self.remember_keys(read, keys);
    }

    /// Launches the batch's flush plan: the chain head when serialization was forced, otherwise
    /// the read and write blocks independently, in parallel.
    pub fn commit(self) {
        if let Some(flush_head) = self.flush_head {
            flush_head.launch(&self.client);
        } else {
            if let Some(block) = self.read_data.block {
                block.launch(&self.client);
            }
            if let Some(block) = self.write_data.block {
                block.launch(&self.client);
            }
        }
    }

    fn check_conflicts(&mut self, read: bool, keys: &[Vec<u8>]) {
        // Once this kind already leads the chain, no new conflict can reverse the direction.
        if self.last_conflict_was_read.matches(read) {
            return;
        }
        let opposite = self.data(!read);
        let conflict = keys.iter().any(|key| opposite.used_keys.contains(key));
        if conflict {
            self.conflict_found(read);
        }
    }

    fn conflict_found(&mut self, read: bool) {
        if self.last_conflict_was_read.is_unknown() {
            // First flip of this batch: the opposite kind's block becomes the chain head and
            // the current kind's block (when already open) runs after it.
            self.flush_head = self.data(!read).block.clone();
            if let (Some(opposite), Some(current)) =
                (&self.data(!read).block, &self.data(read).block)
            {
                let old_value = opposite.set_next(Arc::clone(current));
                if old_value.is_some() {
                    tracing::error!("chain head already had a successor");
                    debug_assert!(
                        old_value.is_none(),
                        "scheduler installed a second successor on one block"
                    );
                }
            }
        } else {
            // Further flip: retire the current kind's open block so the next operation starts
            // a fresh one chained behind the opposite kind's block.
            self.data_mut(read).block = None;
            self.data_mut(read).used_keys.clear();
        }
        self.last_conflict_was_read = ConflictPhase::of(read);
    }

    fn remember_keys(&mut self, read: bool, keys: Vec<Vec<u8>>) {
        let data = self.data_mut(read);
        for key in keys {
            let _ = data.used_keys.insert(key);
        }
    }

    fn data(&self, read: bool) -> &BlockData {
        if read { &self.read_data } else { &self.write_data }
    }

    fn data_mut(&mut self, read: bool) -> &mut BlockData {
        if read {
            &mut self.read_data
        } else {
            &mut self.write_data
        }
    }
}
