//! In-process backend implementation used by tests and local runs.
//!
//! Data lives in one shared table keyed by the primary key column. Flushes execute on a
//! dedicated callback worker thread, so completion continuations observe the same threading
//! model an RPC-backed client would give them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use redgate_common::containers::HotMap;
use redgate_common::error::{RgError, RgResult};

use crate::client::{BackendClient, TableHandle};
use crate::ops::BackendOp;
use crate::session::{FlushCallback, FlushMode, FlushOutcome, Session};

#[path = "memory/store.rs"]
mod store;
#[path = "memory/worker.rs"]
mod worker;

use store::StoredValue;
use worker::{FlushJob, FlushWorker};

type SharedTable = Arc<RwLock<HotMap<Vec<u8>, StoredValue>>>;

/// In-memory storage engine exposed through the [`BackendClient`] trait.
#[derive(Debug)]
pub struct MemoryBackend {
    table: SharedTable,
    worker: FlushWorker,
    injected_flush_failure: Arc<Mutex<Option<String>>>,
    proxies: Mutex<Vec<(String, String)>>,
}

impl MemoryBackend {
    /// Creates a backend with an empty table and a running flush worker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            table: Arc::new(RwLock::new(HotMap::new())),
            worker: FlushWorker::spawn(),
            injected_flush_failure: Arc::new(Mutex::new(None)),
            proxies: Mutex::new(Vec::new()),
        })
    }

    /// Makes the next flush fail with `message` instead of executing its operations.
    ///
    /// Test hook for the aggregate-failure path; per-op diagnostics become collectable from the
    /// flushed session afterwards.
    pub fn inject_flush_failure(&self, message: &str) {
        *self
            .injected_flush_failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(message.to_owned());
    }

    /// Number of registered local proxy shortcuts.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl MemoryBackend {
    /// Concrete-typed session constructor used by this crate's tests.
    #[must_use]
    pub fn new_memory_session(&self, read: bool) -> Arc<MemorySession> {
        Arc::new(MemorySession {
            read,
            timeout_millis: AtomicU64::new(0),
            flush_mode: Mutex::new(FlushMode::Auto),
            buffered: Mutex::new(Vec::new()),
            pending_errors: Arc::new(Mutex::new(Vec::new())),
            table: Arc::clone(&self.table),
            worker: self.worker.handle(),
            injected_flush_failure: Arc::clone(&self.injected_flush_failure),
        })
    }
}

impl BackendClient for MemoryBackend {
    fn new_session(&self, read: bool) -> Arc<dyn Session> {
        self.new_memory_session(read)
    }

    fn open_table(&self, keyspace: &str, name: &str) -> RgResult<TableHandle> {
        if keyspace.is_empty() || name.is_empty() {
            return Err(RgError::InvalidState("table name must not be empty"));
        }
        Ok(TableHandle {
            keyspace: keyspace.to_owned(),
            name: name.to_owned(),
        })
    }

    fn add_tablet_server_proxy(&self, uuid: &str, proxy_addr: &str) {
        self.proxies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((uuid.to_owned(), proxy_addr.to_owned()));
    }
}

/// Session over the shared in-memory table.
///
/// Applied ops stay buffered until `flush_async`; nothing reaches the table before the explicit
/// flush, matching the manual-flush contract the scheduler relies on.
#[derive(Debug)]
pub struct MemorySession {
    read: bool,
    timeout_millis: AtomicU64,
    flush_mode: Mutex<FlushMode>,
    buffered: Mutex<Vec<Arc<BackendOp>>>,
    pending_errors: Arc<Mutex<Vec<String>>>,
    table: SharedTable,
    worker: worker::WorkerHandle,
    injected_flush_failure: Arc<Mutex<Option<String>>>,
}

impl MemorySession {
    /// Timeout last configured through [`Session::set_timeout_millis`].
    #[must_use]
    pub fn timeout_millis(&self) -> u64 {
        self.timeout_millis.load(Ordering::Relaxed)
    }

    /// Number of currently buffered operations.
    #[must_use]
    pub fn buffered_op_count(&self) -> usize {
        self.buffered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl Session for MemorySession {
    fn is_read(&self) -> bool {
        self.read
    }

    fn set_timeout_millis(&self, millis: u64) {
        self.timeout_millis.store(millis, Ordering::Relaxed);
    }

    fn set_flush_mode(&self, mode: FlushMode) -> RgResult<()> {
        if mode == FlushMode::Auto {
            return Err(RgError::InvalidState(
                "memory backend sessions only support manual flush",
            ));
        }
        *self
            .flush_mode
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = mode;
        Ok(())
    }

    fn apply(&self, op: Arc<BackendOp>) -> RgResult<()> {
        if op.is_read() != self.read {
            return Err(RgError::InvalidState(
                "operation kind does not match session type",
            ));
        }
        self.buffered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(op);
        Ok(())
    }

    fn flush_async(&self, callback: FlushCallback) {
        let ops = std::mem::take(
            &mut *self
                .buffered
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        let injected_failure = self
            .injected_flush_failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let job = FlushJob {
            ops,
            table: Arc::clone(&self.table),
            injected_failure,
            pending_errors: Arc::clone(&self.pending_errors),
            callback,
        };
        if let Err(job) = self.worker.submit(job) {
            // Worker already shut down; complete the continuation inline so the caller still
            // receives exactly one status.
            (job.callback)(FlushOutcome::Error("flush worker is shut down".to_owned()));
        }
    }

    fn collect_pending_errors(&self) -> Vec<String> {
        std::mem::take(
            &mut *self
                .pending_errors
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }
}

#[cfg(test)]
#[path = "memory/tests.rs"]
mod tests;
