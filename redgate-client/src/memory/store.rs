//! Table state and per-op execution for the in-memory backend.

use std::str;
use std::time::{SystemTime, UNIX_EPOCH};

use redgate_common::containers::{HotMap, HotSet};
use redgate_common::response::RedisResponse;

use crate::ops::{BackendOp, ReadRequest, WriteRequest};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_AN_INTEGER: &str = "value is not an integer or out of range";
const INCR_OVERFLOW: &str = "increment or decrement would overflow";

/// One stored row, tagged by value shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum StoredValue {
    /// Plain string value with optional expiry deadline.
    String {
        bytes: Vec<u8>,
        expire_at_unix_millis: Option<u64>,
    },
    /// Field/value hash.
    Hash(HotMap<Vec<u8>, Vec<u8>>),
    /// Member set.
    Set(HotSet<Vec<u8>>),
}

type Table = HotMap<Vec<u8>, StoredValue>;

/// Executes one deferred operation against the table and returns its response.
///
/// Command-level failures (wrong value type, non-integer counters) are responses, not flush
/// errors; the flush as a whole still succeeds.
pub(super) fn execute_op(table: &mut Table, op: &BackendOp) -> RedisResponse {
    if let Some(request) = op.read_request() {
        return execute_read(table, request);
    }
    if let Some(request) = op.write_request() {
        return execute_write(table, request);
    }
    RedisResponse::Error("operation carries no payload".to_owned())
}

fn execute_read(table: &mut Table, request: &ReadRequest) -> RedisResponse {
    match request {
        ReadRequest::Get { key } => {
            purge_expired_key(table, key);
            match table.get(key) {
                Some(StoredValue::String { bytes, .. }) => RedisResponse::BulkString(bytes.clone()),
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Null,
            }
        }
        ReadRequest::MGet { keys } => {
            let mut values = Vec::with_capacity(keys.len());
            for key in keys {
                purge_expired_key(table, key);
                let value = match table.get(key) {
                    Some(StoredValue::String { bytes, .. }) => {
                        RedisResponse::BulkString(bytes.clone())
                    }
                    _ => RedisResponse::Null,
                };
                values.push(value);
            }
            RedisResponse::Array(values)
        }
        ReadRequest::HGet { key, field } => {
            purge_expired_key(table, key);
            match table.get(key) {
                Some(StoredValue::Hash(fields)) => fields
                    .get(field)
                    .map_or(RedisResponse::Null, |value| {
                        RedisResponse::BulkString(value.clone())
                    }),
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Null,
            }
        }
        ReadRequest::HMGet { key, fields } => {
            purge_expired_key(table, key);
            match table.get(key) {
                Some(StoredValue::Hash(stored)) => RedisResponse::Array(
                    fields
                        .iter()
                        .map(|field| {
                            stored.get(field).map_or(RedisResponse::Null, |value| {
                                RedisResponse::BulkString(value.clone())
                            })
                        })
                        .collect(),
                ),
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Array(fields.iter().map(|_| RedisResponse::Null).collect()),
            }
        }
        ReadRequest::HGetAll { key } => {
            purge_expired_key(table, key);
            match table.get(key) {
                Some(StoredValue::Hash(stored)) => {
                    // Sorted by field so repeated reads return one stable shape.
                    let mut pairs = stored.iter().collect::<Vec<_>>();
                    pairs.sort_by(|(left, _), (right, _)| left.cmp(right));
                    let mut flat = Vec::with_capacity(pairs.len() * 2);
                    for (field, value) in pairs {
                        flat.push(RedisResponse::BulkString(field.clone()));
                        flat.push(RedisResponse::BulkString(value.clone()));
                    }
                    RedisResponse::Array(flat)
                }
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Array(Vec::new()),
            }
        }
        ReadRequest::SMembers { key } => {
            purge_expired_key(table, key);
            match table.get(key) {
                Some(StoredValue::Set(members)) => {
                    let mut members = members.iter().cloned().collect::<Vec<_>>();
                    members.sort();
                    RedisResponse::Array(
                        members.into_iter().map(RedisResponse::BulkString).collect(),
                    )
                }
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Array(Vec::new()),
            }
        }
        ReadRequest::StrLen { key } => {
            purge_expired_key(table, key);
            match table.get(key) {
                Some(StoredValue::String { bytes, .. }) => {
                    RedisResponse::Integer(i64::try_from(bytes.len()).unwrap_or(i64::MAX))
                }
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Integer(0),
            }
        }
        ReadRequest::Exists { key } => {
            purge_expired_key(table, key);
            RedisResponse::Integer(i64::from(table.contains_key(key)))
        }
        ReadRequest::GetRange { key, start, end } => {
            purge_expired_key(table, key);
            match table.get(key) {
                Some(StoredValue::String { bytes, .. }) => {
                    match normalize_redis_range(*start, *end, bytes.len()) {
                        Some((start_index, end_index)) => {
                            RedisResponse::BulkString(bytes[start_index..=end_index].to_vec())
                        }
                        None => RedisResponse::BulkString(Vec::new()),
                    }
                }
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::BulkString(Vec::new()),
            }
        }
    }
}

fn execute_write(table: &mut Table, request: &WriteRequest) -> RedisResponse {
    match request {
        WriteRequest::Set {
            key,
            value,
            ttl_millis,
        } => {
            let expire_at_unix_millis = ttl_millis.map(|ttl| now_unix_millis().saturating_add(ttl));
            let _ = table.insert(
                key.clone(),
                StoredValue::String {
                    bytes: value.clone(),
                    expire_at_unix_millis,
                },
            );
            RedisResponse::ok()
        }
        WriteRequest::MSet { pairs } => {
            for (key, value) in pairs {
                let _ = table.insert(
                    key.clone(),
                    StoredValue::String {
                        bytes: value.clone(),
                        expire_at_unix_millis: None,
                    },
                );
            }
            RedisResponse::ok()
        }
        WriteRequest::HSet { key, field, value } => {
            purge_expired_key(table, key);
            match table
                .entry(key.clone())
                .or_insert_with(|| StoredValue::Hash(HotMap::new()))
            {
                StoredValue::Hash(fields) => {
                    let inserted = fields.insert(field.clone(), value.clone()).is_none();
                    RedisResponse::Integer(i64::from(inserted))
                }
                _ => RedisResponse::Error(WRONG_TYPE.to_owned()),
            }
        }
        WriteRequest::HMSet { key, pairs } => {
            purge_expired_key(table, key);
            match table
                .entry(key.clone())
                .or_insert_with(|| StoredValue::Hash(HotMap::new()))
            {
                StoredValue::Hash(fields) => {
                    for (field, value) in pairs {
                        let _ = fields.insert(field.clone(), value.clone());
                    }
                    RedisResponse::ok()
                }
                _ => RedisResponse::Error(WRONG_TYPE.to_owned()),
            }
        }
        WriteRequest::HDel { key, fields } => {
            purge_expired_key(table, key);
            match table.get_mut(key) {
                Some(StoredValue::Hash(stored)) => {
                    let mut removed = 0_i64;
                    for field in fields {
                        if stored.remove(field).is_some() {
                            removed += 1;
                        }
                    }
                    if stored.is_empty() {
                        let _ = table.remove(key);
                    }
                    RedisResponse::Integer(removed)
                }
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Integer(0),
            }
        }
        WriteRequest::SAdd { key, members } => {
            purge_expired_key(table, key);
            match table
                .entry(key.clone())
                .or_insert_with(|| StoredValue::Set(HotSet::new()))
            {
                StoredValue::Set(stored) => {
                    let mut added = 0_i64;
                    for member in members {
                        if stored.insert(member.clone()) {
                            added += 1;
                        }
                    }
                    RedisResponse::Integer(added)
                }
                _ => RedisResponse::Error(WRONG_TYPE.to_owned()),
            }
        }
        WriteRequest::SRem { key, members } => {
            purge_expired_key(table, key);
            match table.get_mut(key) {
                Some(StoredValue::Set(stored)) => {
                    let mut removed = 0_i64;
                    for member in members {
                        if stored.remove(member) {
                            removed += 1;
                        }
                    }
                    if stored.is_empty() {
                        let _ = table.remove(key);
                    }
                    RedisResponse::Integer(removed)
                }
                Some(_) => RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Integer(0),
            }
        }
        WriteRequest::GetSet { key, value } => {
            purge_expired_key(table, key);
            let previous = match table.get(key) {
                Some(StoredValue::String { bytes, .. }) => {
                    RedisResponse::BulkString(bytes.clone())
                }
                Some(_) => return RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => RedisResponse::Null,
            };
            let _ = table.insert(
                key.clone(),
                StoredValue::String {
                    bytes: value.clone(),
                    expire_at_unix_millis: None,
                },
            );
            previous
        }
        WriteRequest::Append { key, suffix } => {
            purge_expired_key(table, key);
            let (mut bytes, expire_at_unix_millis) = match table.get(key) {
                Some(StoredValue::String {
                    bytes,
                    expire_at_unix_millis,
                }) => (bytes.clone(), *expire_at_unix_millis),
                Some(_) => return RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => (Vec::new(), None),
            };
            bytes.extend_from_slice(suffix);
            let length = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
            let _ = table.insert(
                key.clone(),
                StoredValue::String {
                    bytes,
                    expire_at_unix_millis,
                },
            );
            RedisResponse::Integer(length)
        }
        WriteRequest::Del { key } => {
            purge_expired_key(table, key);
            RedisResponse::Integer(i64::from(table.remove(key).is_some()))
        }
        WriteRequest::SetRange { key, offset, value } => {
            purge_expired_key(table, key);
            let (mut bytes, expire_at_unix_millis) = match table.get(key) {
                Some(StoredValue::String {
                    bytes,
                    expire_at_unix_millis,
                }) => (bytes.clone(), *expire_at_unix_millis),
                Some(_) => return RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => (Vec::new(), None),
            };
            if value.is_empty() {
                return RedisResponse::Integer(i64::try_from(bytes.len()).unwrap_or(i64::MAX));
            }
            let needed_len = offset.saturating_add(value.len());
            if needed_len > bytes.len() {
                bytes.resize(needed_len, 0_u8);
            }
            bytes[*offset..offset + value.len()].copy_from_slice(value);
            let length = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
            let _ = table.insert(
                key.clone(),
                StoredValue::String {
                    bytes,
                    expire_at_unix_millis,
                },
            );
            RedisResponse::Integer(length)
        }
        WriteRequest::Incr { key } => {
            purge_expired_key(table, key);
            let (current, expire_at_unix_millis) = match table.get(key) {
                Some(StoredValue::String {
                    bytes,
                    expire_at_unix_millis,
                }) => {
                    let Ok(current) = parse_redis_i64(bytes) else {
                        return RedisResponse::Error(NOT_AN_INTEGER.to_owned());
                    };
                    (current, *expire_at_unix_millis)
                }
                Some(_) => return RedisResponse::Error(WRONG_TYPE.to_owned()),
                None => (0_i64, None),
            };
            let Some(next) = current.checked_add(1) else {
                return RedisResponse::Error(INCR_OVERFLOW.to_owned());
            };
            let _ = table.insert(
                key.clone(),
                StoredValue::String {
                    bytes: next.to_string().into_bytes(),
                    expire_at_unix_millis,
                },
            );
            RedisResponse::Integer(next)
        }
    }
}

fn parse_redis_i64(payload: &[u8]) -> Result<i64, ()> {
    let Ok(text) = str::from_utf8(payload) else {
        return Err(());
    };
    text.parse::<i64>().map_err(|_| ())
}

fn normalize_redis_range(start: i64, end: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }

    let len_i64 = i64::try_from(len).unwrap_or(i64::MAX);
    let mut start = if start < 0 {
        len_i64.saturating_add(start)
    } else {
        start
    };
    let mut end = if end < 0 {
        len_i64.saturating_add(end)
    } else {
        end
    };

    if start < 0 {
        start = 0;
    }
    if end < 0 {
        end = 0;
    }
    if start >= len_i64 {
        return None;
    }
    if end >= len_i64 {
        end = len_i64.saturating_sub(1);
    }
    if start > end {
        return None;
    }

    let start_index = usize::try_from(start).ok()?;
    let end_index = usize::try_from(end).ok()?;
    Some((start_index, end_index))
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

fn purge_expired_key(table: &mut Table, key: &[u8]) {
    let expired = matches!(
        table.get(key),
        Some(StoredValue::String {
            expire_at_unix_millis: Some(deadline),
            ..
        }) if *deadline <= now_unix_millis()
    );
    if expired {
        let _ = table.remove(key);
    }
}
