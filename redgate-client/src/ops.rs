//! Deferred backend operations and their response slots.

use std::sync::OnceLock;

use redgate_common::response::RedisResponse;

/// Session type an operation must be applied through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Read-path operation, applied through a read-typed session.
    Read,
    /// Write-path operation, applied through a write-typed session.
    Write,
}

/// Payload of one read operation against the backend table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRequest {
    /// Fetch one string value.
    Get { key: Vec<u8> },
    /// Fetch several string values in one shot.
    MGet { keys: Vec<Vec<u8>> },
    /// Fetch one hash field.
    HGet { key: Vec<u8>, field: Vec<u8> },
    /// Fetch several hash fields.
    HMGet { key: Vec<u8>, fields: Vec<Vec<u8>> },
    /// Fetch all fields and values of one hash.
    HGetAll { key: Vec<u8> },
    /// Fetch all members of one set.
    SMembers { key: Vec<u8> },
    /// Length of one string value.
    StrLen { key: Vec<u8> },
    /// Existence check for one key.
    Exists { key: Vec<u8> },
    /// Substring of one string value with Redis range semantics.
    GetRange { key: Vec<u8>, start: i64, end: i64 },
}

/// Payload of one write operation against the backend table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    /// Store one string value, optionally with a relative TTL.
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        ttl_millis: Option<u64>,
    },
    /// Store several string values.
    MSet { pairs: Vec<(Vec<u8>, Vec<u8>)> },
    /// Store one hash field.
    HSet {
        key: Vec<u8>,
        field: Vec<u8>,
        value: Vec<u8>,
    },
    /// Store several hash fields.
    HMSet {
        key: Vec<u8>,
        pairs: Vec<(Vec<u8>, Vec<u8>)>,
    },
    /// Delete hash fields.
    HDel { key: Vec<u8>, fields: Vec<Vec<u8>> },
    /// Add members to one set.
    SAdd { key: Vec<u8>, members: Vec<Vec<u8>> },
    /// Remove members from one set.
    SRem { key: Vec<u8>, members: Vec<Vec<u8>> },
    /// Store one string value and return the previous one.
    GetSet { key: Vec<u8>, value: Vec<u8> },
    /// Append to one string value.
    Append { key: Vec<u8>, suffix: Vec<u8> },
    /// Delete one key.
    Del { key: Vec<u8> },
    /// Overwrite part of one string value at a byte offset.
    SetRange {
        key: Vec<u8>,
        offset: usize,
        value: Vec<u8>,
    },
    /// Increment one integer-valued key by one.
    Incr { key: Vec<u8> },
}

/// One deferred operation handed to a session for execution at flush time.
///
/// The response slot is written exactly once by the backend while the flush executes and read
/// afterwards by whoever routed the operation. Ops are shared through `Arc` between the session
/// and the scheduler, mirroring the joint ownership the flush protocol needs.
#[derive(Debug)]
pub struct BackendOp {
    kind: OpKind,
    request: OpRequest,
    response: OnceLock<RedisResponse>,
}

#[derive(Debug)]
enum OpRequest {
    Read(ReadRequest),
    Write(WriteRequest),
}

impl BackendOp {
    /// Wraps one read request.
    #[must_use]
    pub fn read(request: ReadRequest) -> Self {
        Self {
            kind: OpKind::Read,
            request: OpRequest::Read(request),
            response: OnceLock::new(),
        }
    }

    /// Wraps one write request.
    #[must_use]
    pub fn write(request: WriteRequest) -> Self {
        Self {
            kind: OpKind::Write,
            request: OpRequest::Write(request),
            response: OnceLock::new(),
        }
    }

    /// Session type this operation must be applied through.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Returns whether this is a read-path operation.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.kind == OpKind::Read
    }

    /// Read payload, when this is a read operation.
    #[must_use]
    pub fn read_request(&self) -> Option<&ReadRequest> {
        match &self.request {
            OpRequest::Read(request) => Some(request),
            OpRequest::Write(_) => None,
        }
    }

    /// Write payload, when this is a write operation.
    #[must_use]
    pub fn write_request(&self) -> Option<&WriteRequest> {
        match &self.request {
            OpRequest::Read(_) => None,
            OpRequest::Write(request) => Some(request),
        }
    }

    /// Value of the well-known key column of this operation's row.
    ///
    /// Multi-key payloads report their first key; that is the key the scheduler tracks for
    /// conflict detection.
    #[must_use]
    pub fn primary_key(&self) -> &[u8] {
        match &self.request {
            OpRequest::Read(request) => match request {
                ReadRequest::Get { key }
                | ReadRequest::HGet { key, .. }
                | ReadRequest::HMGet { key, .. }
                | ReadRequest::HGetAll { key }
                | ReadRequest::SMembers { key }
                | ReadRequest::StrLen { key }
                | ReadRequest::Exists { key }
                | ReadRequest::GetRange { key, .. } => key,
                ReadRequest::MGet { keys } => keys.first().map(Vec::as_slice).unwrap_or_default(),
            },
            OpRequest::Write(request) => match request {
                WriteRequest::Set { key, .. }
                | WriteRequest::HSet { key, .. }
                | WriteRequest::HMSet { key, .. }
                | WriteRequest::HDel { key, .. }
                | WriteRequest::SAdd { key, .. }
                | WriteRequest::SRem { key, .. }
                | WriteRequest::GetSet { key, .. }
                | WriteRequest::Append { key, .. }
                | WriteRequest::Del { key }
                | WriteRequest::SetRange { key, .. }
                | WriteRequest::Incr { key } => key,
                WriteRequest::MSet { pairs } => {
                    pairs.first().map(|(key, _)| key.as_slice()).unwrap_or_default()
                }
            },
        }
    }

    /// Publishes the backend-populated response. The slot is write-once; a second write is a
    /// backend bug and keeps the first value.
    pub fn set_response(&self, response: RedisResponse) {
        if self.response.set(response).is_err() {
            tracing::error!(key = ?self.primary_key(), "backend populated one response slot twice");
            debug_assert!(false, "response slot must be written at most once");
        }
    }

    /// Response populated during the flush, when present.
    #[must_use]
    pub fn response(&self) -> Option<&RedisResponse> {
        self.response.get()
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendOp, ReadRequest, WriteRequest};
    use googletest::prelude::*;
    use redgate_common::response::RedisResponse;
    use rstest::rstest;

    #[rstest]
    fn primary_key_reports_first_key_of_multi_key_payloads() {
        let mget = BackendOp::read(ReadRequest::MGet {
            keys: vec![b"k1".to_vec(), b"k2".to_vec()],
        });
        assert_that!(mget.primary_key(), eq(b"k1".as_slice()));

        let mset = BackendOp::write(WriteRequest::MSet {
            pairs: vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())],
        });
        assert_that!(mset.primary_key(), eq(b"a".as_slice()));
    }

    #[rstest]
    fn response_slot_keeps_first_written_value() {
        let op = BackendOp::read(ReadRequest::Get { key: b"k".to_vec() });
        assert_that!(op.response().is_none(), eq(true));

        op.set_response(RedisResponse::Integer(1));
        assert_that!(op.response(), eq(Some(&RedisResponse::Integer(1))));
    }
}
