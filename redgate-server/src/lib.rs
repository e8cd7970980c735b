//! Service entry point of the front-end.
//!
//! The RPC transport delivers one inbound call per pipelined batch; [`service::RedisService`]
//! validates and parses each command, feeds the scheduler, and commits the launch plan. The
//! transport itself lives outside this workspace.

pub mod call;
pub mod service;

pub use call::{CallReply, InboundCall};
pub use service::RedisService;
