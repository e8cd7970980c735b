//! Batch scheduling core.
//!
//! One inbound call carries a pipeline of parsed commands. The scheduler groups their backend
//! operations into homogeneous read/write blocks, runs opposite-kind blocks in parallel while
//! their key footprints stay disjoint, and chains them into a serial launch order as soon as a
//! cross-kind conflict shows up.

pub mod block;
pub mod context;
pub mod operation;
pub mod sink;

pub use block::Block;
pub use context::BatchContext;
pub use operation::Operation;
pub use sink::ResponseSink;
