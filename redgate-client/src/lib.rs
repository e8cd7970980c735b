//! Backend client abstraction consumed by the front-end.
//!
//! The storage engine is reached through typed sessions that buffer deferred operations and
//! flush them asynchronously. This crate defines those interfaces plus an in-process
//! [`memory::MemoryBackend`] implementation used by tests and local runs.

pub mod client;
pub mod memory;
pub mod ops;
pub mod session;

pub use client::{BackendClient, BackendClientBuilder, TableHandle};
pub use ops::{BackendOp, OpKind, ReadRequest, WriteRequest};
pub use session::{FlushCallback, FlushMode, FlushOutcome, Session};
