//! Homogeneous operation blocks and their asynchronous flush lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use redgate_client::client::BackendClient;
use redgate_client::session::{FlushMode, FlushOutcome, Session};
use redgate_common::error::RgError;
use redgate_common::metrics::LatencyHistogram;

use crate::operation::Operation;
use crate::sink::ResponseSink;

/// One all-read or all-write group of operations sharing a single backend session.
///
/// A block is filled by the scheduler, launched exactly once, responds for every operation it
/// kept, and then launches its successor. It is owned jointly by the predecessor's successor
/// pointer (or the scheduler's flush head) and by the in-flight flush callback.
pub struct Block {
    call: Arc<dyn ResponseSink>,
    latency_internal: Arc<LatencyHistogram>,
    timeout_millis: u64,
    start: Instant,
    ops: Mutex<Vec<Operation>>,
    session: Mutex<Option<Arc<dyn Session>>>,
    client: Mutex<Option<Arc<dyn BackendClient>>>,
    next: Mutex<Option<Arc<Block>>>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("ops", &self.ops.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len())
            .field("chained", &self.next.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_some())
            .finish()
    }
}

impl Block {
    /// Creates an empty block bound to its call and internal flush histogram.
    #[must_use]
    pub fn new(
        call: Arc<dyn ResponseSink>,
        latency_internal: Arc<LatencyHistogram>,
        timeout_millis: u64,
    ) -> Self {
        Self {
            call,
            latency_internal,
            timeout_millis,
            start: Instant::now(),
            ops: Mutex::new(Vec::new()),
            session: Mutex::new(None),
            client: Mutex::new(None),
            next: Mutex::new(None),
        }
    }

    /// Appends one operation. Operations are applied to the session in append order.
    pub fn add_operation(&self, operation: Operation) {
        self.ops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(operation);
    }

    /// Installs the successor launched after this block's flush completes.
    ///
    /// Returns any previously installed successor. Under correct scheduler operation that is
    /// always `None`; callers treat a returned block as a programmer error.
    #[must_use]
    pub fn set_next(&self, next: Arc<Block>) -> Option<Arc<Block>> {
        self.next
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace(next)
    }

    /// Allocates the session, applies all operations, and submits the asynchronous flush.
    ///
    /// Operations the session rejects synchronously respond with their failure immediately and
    /// drop out of the block. When nothing was accepted the flush is skipped entirely and the
    /// successor launches right away.
    pub fn launch(self: Arc<Self>, client: &Arc<dyn BackendClient>) {
        *self
            .client
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Arc::clone(client));

        let ops = std::mem::take(
            &mut *self
                .ops
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        let Some(first) = ops.first() else {
            self.launch_next();
            return;
        };

        let session = client.new_session(first.is_read());
        session.set_timeout_millis(self.timeout_millis);
        if let Err(error) = session.set_flush_mode(FlushMode::Manual) {
            tracing::error!(%error, "backend session rejected manual flush mode");
            for operation in &ops {
                self.call.respond_failure(operation.index(), error.clone());
            }
            self.launch_next();
            return;
        }

        let mut applied = Vec::with_capacity(ops.len());
        for operation in ops {
            match operation.apply(session.as_ref()) {
                Ok(()) => applied.push(operation),
                Err(error) => self.call.respond_failure(operation.index(), error),
            }
        }

        if applied.is_empty() {
            self.launch_next();
            return;
        }

        *self
            .ops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = applied;
        *self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Arc::clone(&session));

        let block = Arc::clone(&self);
        session.flush_async(Box::new(move |outcome| block.done(outcome)));
    }

    /// Flush completion continuation: responds for every kept operation, then cascades.
    fn done(self: Arc<Self>, outcome: FlushOutcome) {
        let elapsed_micros =
            u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.latency_internal.record_micros(elapsed_micros);

        let ops = std::mem::take(
            &mut *self
                .ops
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        match outcome {
            FlushOutcome::Ok => {
                for operation in &ops {
                    self.call
                        .respond_success(operation.index(), operation.response(), operation.latency());
                }
            }
            FlushOutcome::Error(message) => {
                let session = self
                    .session
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .take();
                if let Some(session) = session {
                    for pending in session.collect_pending_errors() {
                        tracing::warn!(error = %pending, "explicit error while flushing");
                    }
                }
                for operation in &ops {
                    self.call
                        .respond_failure(operation.index(), RgError::Backend(message.clone()));
                }
            }
        }

        // A failed flush still hands control to the successor.
        self.launch_next();
    }

    fn launch_next(&self) {
        let next = self
            .next
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(next) = next else {
            return;
        };
        let client = self
            .client
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        if let Some(client) = client {
            next.launch(&client);
        }
    }
}
