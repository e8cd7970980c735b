//! Typed backend sessions with manual flush.

use std::sync::Arc;

use redgate_common::error::RgResult;

use crate::ops::BackendOp;

/// Flush discipline of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Applied operations are buffered until an explicit flush.
    Manual,
    /// The session may flush on its own. Unused by the front-end.
    Auto,
}

/// Aggregate status delivered to the flush callback.
///
/// The backend's flush is all-or-nothing: a failure carries one status for the whole buffered
/// batch, not per-op verdicts. Per-op diagnostics are drained separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// All buffered operations executed and populated their response slots.
    Ok,
    /// The flush failed as a whole.
    Error(String),
}

impl FlushOutcome {
    /// Returns whether the flush succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// One-shot completion continuation invoked from a backend callback thread.
pub type FlushCallback = Box<dyn FnOnce(FlushOutcome) + Send + 'static>;

/// One backend session, typed for reads or writes at allocation time.
///
/// Sessions buffer applied operations and submit them as one batch on flush. They are shared
/// between the scheduler and the in-flight flush, so all methods take `&self`.
pub trait Session: Send + Sync {
    /// Returns whether this session executes read operations.
    fn is_read(&self) -> bool;

    /// Sets the RPC timeout applied to flushes of this session.
    fn set_timeout_millis(&self, millis: u64);

    /// Switches the flush discipline.
    ///
    /// # Errors
    ///
    /// Returns an error when the session implementation does not support the requested mode.
    fn set_flush_mode(&self, mode: FlushMode) -> RgResult<()>;

    /// Enqueues one operation for deferred execution.
    ///
    /// # Errors
    ///
    /// Returns an error when the session rejects the operation synchronously, for example on a
    /// kind/session type mismatch. A rejected operation is not buffered.
    fn apply(&self, op: Arc<BackendOp>) -> RgResult<()>;

    /// Submits all buffered operations and invokes `callback` exactly once with the aggregate
    /// status. The callback runs on a backend callback thread.
    fn flush_async(&self, callback: FlushCallback);

    /// Drains per-op diagnostics collected by the last failed flush.
    fn collect_pending_errors(&self) -> Vec<String>;
}
