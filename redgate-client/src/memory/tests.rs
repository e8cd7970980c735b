use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use googletest::prelude::*;
use redgate_common::response::RedisResponse;
use rstest::rstest;

use crate::client::BackendClient;
use crate::memory::MemoryBackend;
use crate::ops::{BackendOp, ReadRequest, WriteRequest};
use crate::session::{FlushMode, FlushOutcome, Session};

fn flush_and_wait(session: &dyn Session) -> FlushOutcome {
    let (sender, receiver) = mpsc::channel();
    session.flush_async(Box::new(move |outcome| {
        let _ = sender.send(outcome);
    }));
    receiver
        .recv_timeout(Duration::from_secs(5))
        .expect("flush callback should be invoked")
}

fn apply_write(session: &dyn Session, request: WriteRequest) -> Arc<BackendOp> {
    let op = Arc::new(BackendOp::write(request));
    session
        .apply(Arc::clone(&op))
        .expect("write op should be accepted by a write session");
    op
}

fn apply_read(session: &dyn Session, request: ReadRequest) -> Arc<BackendOp> {
    let op = Arc::new(BackendOp::read(request));
    session
        .apply(Arc::clone(&op))
        .expect("read op should be accepted by a read session");
    op
}

#[rstest]
fn session_rejects_kind_mismatch_synchronously() {
    let backend = MemoryBackend::new();
    let read_session = backend.new_session(true);

    let write_op = Arc::new(BackendOp::write(WriteRequest::Del { key: b"k".to_vec() }));
    assert_that!(read_session.apply(write_op).is_err(), eq(true));
}

#[rstest]
fn manual_flush_buffers_ops_until_explicit_flush() {
    let backend = MemoryBackend::new();
    let write_session = backend.new_session(false);
    write_session
        .set_flush_mode(FlushMode::Manual)
        .expect("manual flush mode is supported");
    let set_op = apply_write(
        write_session.as_ref(),
        WriteRequest::Set {
            key: b"k1".to_vec(),
            value: b"v1".to_vec(),
            ttl_millis: None,
        },
    );

    // Nothing is visible before the explicit flush.
    let read_session = backend.new_session(true);
    let get_before = apply_read(read_session.as_ref(), ReadRequest::Get { key: b"k1".to_vec() });
    assert_that!(flush_and_wait(read_session.as_ref()).is_ok(), eq(true));
    assert_that!(get_before.response(), eq(Some(&RedisResponse::Null)));

    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));
    assert_that!(set_op.response(), eq(Some(&RedisResponse::ok())));

    let read_session = backend.new_session(true);
    let get_after = apply_read(read_session.as_ref(), ReadRequest::Get { key: b"k1".to_vec() });
    assert_that!(flush_and_wait(read_session.as_ref()).is_ok(), eq(true));
    assert_that!(
        get_after.response(),
        eq(Some(&RedisResponse::BulkString(b"v1".to_vec())))
    );
}

#[rstest]
fn auto_flush_mode_is_rejected() {
    let backend = MemoryBackend::new();
    let session = backend.new_session(false);
    assert_that!(session.set_flush_mode(FlushMode::Auto).is_err(), eq(true));
}

#[rstest]
fn wrong_type_is_a_per_op_response_inside_a_successful_flush() {
    let backend = MemoryBackend::new();
    let write_session = backend.new_session(false);
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::SAdd {
            key: b"colors".to_vec(),
            members: vec![b"red".to_vec()],
        },
    );
    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));

    let read_session = backend.new_session(true);
    let get = apply_read(
        read_session.as_ref(),
        ReadRequest::Get { key: b"colors".to_vec() },
    );
    let members = apply_read(
        read_session.as_ref(),
        ReadRequest::SMembers { key: b"colors".to_vec() },
    );

    assert_that!(flush_and_wait(read_session.as_ref()).is_ok(), eq(true));
    assert_that!(
        matches!(get.response(), Some(RedisResponse::Error(message)) if message.starts_with("WRONGTYPE")),
        eq(true)
    );
    assert_that!(
        members.response(),
        eq(Some(&RedisResponse::Array(vec![RedisResponse::BulkString(
            b"red".to_vec()
        )])))
    );
}

#[rstest]
fn injected_failure_reports_aggregate_status_and_pending_errors() {
    let backend = MemoryBackend::new();
    backend.inject_flush_failure("tablet leader unavailable");

    let write_session = backend.new_session(false);
    let set_op = apply_write(
        write_session.as_ref(),
        WriteRequest::Set {
            key: b"k1".to_vec(),
            value: b"v1".to_vec(),
            ttl_millis: None,
        },
    );

    let outcome = flush_and_wait(write_session.as_ref());
    assert_that!(
        outcome,
        eq(&FlushOutcome::Error("tablet leader unavailable".to_owned()))
    );
    assert_that!(set_op.response().is_none(), eq(true));

    let pending = write_session.collect_pending_errors();
    assert_that!(pending.len(), eq(1_usize));
    assert_that!(pending[0].contains("tablet leader unavailable"), eq(true));
    // Drained once; a second collection is empty.
    assert_that!(write_session.collect_pending_errors().is_empty(), eq(true));

    // The next flush works again.
    let retry_op = apply_write(
        write_session.as_ref(),
        WriteRequest::Set {
            key: b"k1".to_vec(),
            value: b"v1".to_vec(),
            ttl_millis: None,
        },
    );
    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));
    assert_that!(retry_op.response(), eq(Some(&RedisResponse::ok())));
}

#[rstest]
fn counter_and_string_edits_follow_redis_semantics() {
    let backend = MemoryBackend::new();
    let write_session = backend.new_session(false);

    let first_incr = apply_write(
        write_session.as_ref(),
        WriteRequest::Incr { key: b"count".to_vec() },
    );
    let second_incr = apply_write(
        write_session.as_ref(),
        WriteRequest::Incr { key: b"count".to_vec() },
    );
    let append = apply_write(
        write_session.as_ref(),
        WriteRequest::Append {
            key: b"text".to_vec(),
            suffix: b"hello".to_vec(),
        },
    );
    let setrange = apply_write(
        write_session.as_ref(),
        WriteRequest::SetRange {
            key: b"text".to_vec(),
            offset: 6,
            value: b"world".to_vec(),
        },
    );
    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));

    assert_that!(first_incr.response(), eq(Some(&RedisResponse::Integer(1))));
    assert_that!(second_incr.response(), eq(Some(&RedisResponse::Integer(2))));
    assert_that!(append.response(), eq(Some(&RedisResponse::Integer(5))));
    assert_that!(setrange.response(), eq(Some(&RedisResponse::Integer(11))));

    let read_session = backend.new_session(true);
    let range = apply_read(
        read_session.as_ref(),
        ReadRequest::GetRange {
            key: b"text".to_vec(),
            start: 0,
            end: -1,
        },
    );
    let strlen = apply_read(
        read_session.as_ref(),
        ReadRequest::StrLen { key: b"text".to_vec() },
    );
    assert_that!(flush_and_wait(read_session.as_ref()).is_ok(), eq(true));
    assert_that!(
        range.response(),
        eq(Some(&RedisResponse::BulkString(b"hello\0world".to_vec())))
    );
    assert_that!(strlen.response(), eq(Some(&RedisResponse::Integer(11))));
}

#[rstest]
fn getrange_clamps_a_deeply_negative_end_to_the_first_byte() {
    let backend = MemoryBackend::new();
    let write_session = backend.new_session(false);
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::Set {
            key: b"k".to_vec(),
            value: b"hello".to_vec(),
            ttl_millis: None,
        },
    );
    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));

    let read_session = backend.new_session(true);
    let clamped = apply_read(
        read_session.as_ref(),
        ReadRequest::GetRange {
            key: b"k".to_vec(),
            start: 0,
            end: -100,
        },
    );
    let inverted = apply_read(
        read_session.as_ref(),
        ReadRequest::GetRange {
            key: b"k".to_vec(),
            start: 3,
            end: -100,
        },
    );
    assert_that!(flush_and_wait(read_session.as_ref()).is_ok(), eq(true));
    // An end before the start of the string clamps to byte zero, not to an empty reply.
    assert_that!(
        clamped.response(),
        eq(Some(&RedisResponse::BulkString(b"h".to_vec())))
    );
    assert_that!(
        inverted.response(),
        eq(Some(&RedisResponse::BulkString(Vec::new())))
    );
}

#[rstest]
fn incr_distinguishes_overflow_from_non_integer_values() {
    let backend = MemoryBackend::new();
    let write_session = backend.new_session(false);
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::Set {
            key: b"max".to_vec(),
            value: i64::MAX.to_string().into_bytes(),
            ttl_millis: None,
        },
    );
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::Set {
            key: b"text".to_vec(),
            value: b"abc".to_vec(),
            ttl_millis: None,
        },
    );
    let overflow = apply_write(
        write_session.as_ref(),
        WriteRequest::Incr { key: b"max".to_vec() },
    );
    let not_integer = apply_write(
        write_session.as_ref(),
        WriteRequest::Incr { key: b"text".to_vec() },
    );
    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));

    assert_that!(
        overflow.response(),
        eq(Some(&RedisResponse::Error(
            "increment or decrement would overflow".to_owned()
        )))
    );
    assert_that!(
        not_integer.response(),
        eq(Some(&RedisResponse::Error(
            "value is not an integer or out of range".to_owned()
        )))
    );
}

#[rstest]
fn hash_ops_round_trip_with_stable_field_order() {
    let backend = MemoryBackend::new();
    let write_session = backend.new_session(false);
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::HMSet {
            key: b"h".to_vec(),
            pairs: vec![
                (b"beta".to_vec(), b"2".to_vec()),
                (b"alpha".to_vec(), b"1".to_vec()),
            ],
        },
    );
    let hset_new = apply_write(
        write_session.as_ref(),
        WriteRequest::HSet {
            key: b"h".to_vec(),
            field: b"gamma".to_vec(),
            value: b"3".to_vec(),
        },
    );
    let hset_overwrite = apply_write(
        write_session.as_ref(),
        WriteRequest::HSet {
            key: b"h".to_vec(),
            field: b"alpha".to_vec(),
            value: b"one".to_vec(),
        },
    );
    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));
    assert_that!(hset_new.response(), eq(Some(&RedisResponse::Integer(1))));
    assert_that!(hset_overwrite.response(), eq(Some(&RedisResponse::Integer(0))));

    let read_session = backend.new_session(true);
    let all = apply_read(read_session.as_ref(), ReadRequest::HGetAll { key: b"h".to_vec() });
    assert_that!(flush_and_wait(read_session.as_ref()).is_ok(), eq(true));
    assert_that!(
        all.response(),
        eq(Some(&RedisResponse::Array(vec![
            RedisResponse::BulkString(b"alpha".to_vec()),
            RedisResponse::BulkString(b"one".to_vec()),
            RedisResponse::BulkString(b"beta".to_vec()),
            RedisResponse::BulkString(b"2".to_vec()),
            RedisResponse::BulkString(b"gamma".to_vec()),
            RedisResponse::BulkString(b"3".to_vec()),
        ])))
    );
}

#[rstest]
fn multi_key_and_field_reads_report_missing_entries_as_null() {
    let backend = MemoryBackend::new();
    let write_session = backend.new_session(false);
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::MSet {
            pairs: vec![
                (b"k1".to_vec(), b"v1".to_vec()),
                (b"k2".to_vec(), b"v2".to_vec()),
            ],
        },
    );
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::HMSet {
            key: b"h".to_vec(),
            pairs: vec![(b"f1".to_vec(), b"x".to_vec())],
        },
    );
    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));

    let read_session = backend.new_session(true);
    let mget = apply_read(
        read_session.as_ref(),
        ReadRequest::MGet {
            keys: vec![b"k1".to_vec(), b"missing".to_vec(), b"k2".to_vec()],
        },
    );
    let hget = apply_read(
        read_session.as_ref(),
        ReadRequest::HGet {
            key: b"h".to_vec(),
            field: b"f1".to_vec(),
        },
    );
    let hmget = apply_read(
        read_session.as_ref(),
        ReadRequest::HMGet {
            key: b"h".to_vec(),
            fields: vec![b"f1".to_vec(), b"f2".to_vec()],
        },
    );
    assert_that!(flush_and_wait(read_session.as_ref()).is_ok(), eq(true));

    assert_that!(
        mget.response(),
        eq(Some(&RedisResponse::Array(vec![
            RedisResponse::BulkString(b"v1".to_vec()),
            RedisResponse::Null,
            RedisResponse::BulkString(b"v2".to_vec()),
        ])))
    );
    assert_that!(
        hget.response(),
        eq(Some(&RedisResponse::BulkString(b"x".to_vec())))
    );
    assert_that!(
        hmget.response(),
        eq(Some(&RedisResponse::Array(vec![
            RedisResponse::BulkString(b"x".to_vec()),
            RedisResponse::Null,
        ])))
    );
}

#[rstest]
fn container_removals_drop_empty_entries() {
    let backend = MemoryBackend::new();
    let write_session = backend.new_session(false);
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::HMSet {
            key: b"h".to_vec(),
            pairs: vec![(b"f1".to_vec(), b"x".to_vec())],
        },
    );
    let _ = apply_write(
        write_session.as_ref(),
        WriteRequest::SAdd {
            key: b"s".to_vec(),
            members: vec![b"a".to_vec()],
        },
    );
    let hdel = apply_write(
        write_session.as_ref(),
        WriteRequest::HDel {
            key: b"h".to_vec(),
            fields: vec![b"f1".to_vec(), b"f2".to_vec()],
        },
    );
    let srem = apply_write(
        write_session.as_ref(),
        WriteRequest::SRem {
            key: b"s".to_vec(),
            members: vec![b"a".to_vec()],
        },
    );
    assert_that!(flush_and_wait(write_session.as_ref()).is_ok(), eq(true));
    assert_that!(hdel.response(), eq(Some(&RedisResponse::Integer(1))));
    assert_that!(srem.response(), eq(Some(&RedisResponse::Integer(1))));

    let read_session = backend.new_session(true);
    let hash_exists = apply_read(read_session.as_ref(), ReadRequest::Exists { key: b"h".to_vec() });
    let set_exists = apply_read(read_session.as_ref(), ReadRequest::Exists { key: b"s".to_vec() });
    assert_that!(flush_and_wait(read_session.as_ref()).is_ok(), eq(true));
    assert_that!(hash_exists.response(), eq(Some(&RedisResponse::Integer(0))));
    assert_that!(set_exists.response(), eq(Some(&RedisResponse::Integer(0))));
}

#[rstest]
fn session_records_timeout_and_buffer_depth() {
    let backend = MemoryBackend::new();
    let session = backend.new_memory_session(false);
    session.set_timeout_millis(60_000);
    assert_that!(session.timeout_millis(), eq(60_000_u64));
    assert_that!(session.is_read(), eq(false));

    let _ = apply_write(
        session.as_ref(),
        WriteRequest::Del { key: b"k".to_vec() },
    );
    assert_that!(session.buffered_op_count(), eq(1_usize));
    assert_that!(flush_and_wait(session.as_ref()).is_ok(), eq(true));
    assert_that!(session.buffered_op_count(), eq(0_usize));
}
