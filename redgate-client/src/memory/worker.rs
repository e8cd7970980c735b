//! Flush callback worker for the in-memory backend.
//!
//! The worker owns one thread hosting a current-thread Tokio runtime fed by an unbounded
//! channel. Flush jobs execute there sequentially and invoke their completion callbacks from
//! that thread, which is what gives the front-end its "backend callback thread" environment.

use std::sync::{Arc, Mutex};
use std::thread;

use tokio::runtime::Builder as TokioBuilder;
use tokio::sync::mpsc;

use crate::ops::BackendOp;
use crate::session::{FlushCallback, FlushOutcome};

use super::SharedTable;
use super::store;

/// One submitted flush: the buffered ops, the table to run them against, and the continuation.
pub(super) struct FlushJob {
    pub(super) ops: Vec<Arc<BackendOp>>,
    pub(super) table: SharedTable,
    pub(super) injected_failure: Option<String>,
    pub(super) pending_errors: Arc<Mutex<Vec<String>>>,
    pub(super) callback: FlushCallback,
}

impl std::fmt::Debug for FlushJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushJob")
            .field("ops", &self.ops.len())
            .field("injected_failure", &self.injected_failure)
            .finish()
    }
}

/// Cloneable submission handle shared with sessions.
#[derive(Debug, Clone)]
pub(super) struct WorkerHandle {
    sender: mpsc::UnboundedSender<FlushJob>,
}

impl WorkerHandle {
    /// Submits one job, giving it back when the worker is gone.
    pub(super) fn submit(&self, job: FlushJob) -> Result<(), FlushJob> {
        self.sender.send(job).map_err(|error| error.0)
    }
}

/// Owner of the worker thread; dropping it drains and joins the thread.
#[derive(Debug)]
pub(super) struct FlushWorker {
    sender: Option<mpsc::UnboundedSender<FlushJob>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FlushWorker {
    /// Starts the worker thread.
    pub(super) fn spawn() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<FlushJob>();
        let thread = thread::spawn(move || flush_worker_thread_main(receiver));
        Self {
            sender: Some(sender),
            thread: Some(thread),
        }
    }

    /// Returns a submission handle for sessions.
    pub(super) fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            sender: self
                .sender
                .clone()
                .expect("flush worker sender exists until drop"),
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn flush_worker_thread_main(mut receiver: mpsc::UnboundedReceiver<FlushJob>) {
    let Ok(runtime) = TokioBuilder::new_current_thread().enable_time().build() else {
        return;
    };

    runtime.block_on(async move {
        while let Some(job) = receiver.recv().await {
            run_flush_job(job);
        }
    });
}

fn run_flush_job(job: FlushJob) {
    if let Some(message) = job.injected_failure {
        let mut pending = job
            .pending_errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for op in &job.ops {
            pending.push(format!(
                "op on key {:?}: {message}",
                String::from_utf8_lossy(op.primary_key())
            ));
        }
        drop(pending);
        (job.callback)(FlushOutcome::Error(message));
        return;
    }

    let mut table = job
        .table
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    for op in &job.ops {
        let response = store::execute_op(&mut table, op);
        op.set_response(response);
    }
    drop(table);

    (job.callback)(FlushOutcome::Ok);
}
