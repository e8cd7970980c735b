//! Canonical command response representation.
//!
//! The enum mirrors the backend's wire-level response proto and stays protocol-neutral; encoding
//! to RESP happens at the connection edge, outside this workspace.

/// One per-command response routed back to the inbound call by batch index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisResponse {
    /// `+OK` style status replies.
    SimpleString(String),
    /// Binary-safe string payload.
    BulkString(Vec<u8>),
    /// Missing key / missing field reply.
    Null,
    /// Integer reply.
    Integer(i64),
    /// Array reply used by multi-key and container reads.
    Array(Vec<RedisResponse>),
    /// Command-level error carried inside an otherwise successful flush.
    Error(String),
}

impl RedisResponse {
    /// Canonical `OK` status reply.
    #[must_use]
    pub fn ok() -> Self {
        Self::SimpleString("OK".to_owned())
    }
}
