//! Per-command argument parsers.
//!
//! Each parser is a pure function of the token vector. Arity has already been validated by the
//! dispatcher, so parsers only check argument types and fill the backend payload.

use redgate_client::ops::{ReadRequest, WriteRequest};
use redgate_common::command::RedisCommand;

fn token(command: &RedisCommand, index: usize) -> Vec<u8> {
    command.token(index).unwrap_or_default().to_vec()
}

fn tail_tokens(command: &RedisCommand, from: usize) -> Vec<Vec<u8>> {
    (from..command.len()).map(|index| token(command, index)).collect()
}

fn tail_pairs(command: &RedisCommand, from: usize) -> Option<Vec<(Vec<u8>, Vec<u8>)>> {
    let tail = command.len().checked_sub(from)?;
    if tail == 0 || !tail.is_multiple_of(2) {
        return None;
    }
    Some(
        (0..tail / 2)
            .map(|pair| {
                let base = from + pair * 2;
                (token(command, base), token(command, base + 1))
            })
            .collect(),
    )
}

fn parse_i64_token(command: &RedisCommand, index: usize) -> Option<i64> {
    let raw = token(command, index);
    std::str::from_utf8(&raw).ok()?.parse::<i64>().ok()
}

fn parse_u64_token(command: &RedisCommand, index: usize) -> Option<u64> {
    let raw = token(command, index);
    std::str::from_utf8(&raw).ok()?.parse::<u64>().ok()
}

pub(super) fn parse_get(command: &RedisCommand) -> Result<ReadRequest, String> {
    Ok(ReadRequest::Get {
        key: token(command, 1),
    })
}

pub(super) fn parse_mget(command: &RedisCommand) -> Result<ReadRequest, String> {
    Ok(ReadRequest::MGet {
        keys: tail_tokens(command, 1),
    })
}

pub(super) fn parse_hget(command: &RedisCommand) -> Result<ReadRequest, String> {
    Ok(ReadRequest::HGet {
        key: token(command, 1),
        field: token(command, 2),
    })
}

pub(super) fn parse_hmget(command: &RedisCommand) -> Result<ReadRequest, String> {
    Ok(ReadRequest::HMGet {
        key: token(command, 1),
        fields: tail_tokens(command, 2),
    })
}

pub(super) fn parse_hgetall(command: &RedisCommand) -> Result<ReadRequest, String> {
    Ok(ReadRequest::HGetAll {
        key: token(command, 1),
    })
}

pub(super) fn parse_smembers(command: &RedisCommand) -> Result<ReadRequest, String> {
    Ok(ReadRequest::SMembers {
        key: token(command, 1),
    })
}

pub(super) fn parse_strlen(command: &RedisCommand) -> Result<ReadRequest, String> {
    Ok(ReadRequest::StrLen {
        key: token(command, 1),
    })
}

pub(super) fn parse_exists(command: &RedisCommand) -> Result<ReadRequest, String> {
    Ok(ReadRequest::Exists {
        key: token(command, 1),
    })
}

pub(super) fn parse_getrange(command: &RedisCommand) -> Result<ReadRequest, String> {
    let Some(start) = parse_i64_token(command, 2) else {
        return Err("Range boundary is not an integer.".to_owned());
    };
    let Some(end) = parse_i64_token(command, 3) else {
        return Err("Range boundary is not an integer.".to_owned());
    };
    Ok(ReadRequest::GetRange {
        key: token(command, 1),
        start,
        end,
    })
}

pub(super) fn parse_set(command: &RedisCommand) -> Result<WriteRequest, String> {
    let mut ttl_millis = None;
    let mut index = 3;
    while index < command.len() {
        let option = token(command, index);
        let multiplier = if option.eq_ignore_ascii_case(b"EX") {
            1_000
        } else if option.eq_ignore_ascii_case(b"PX") {
            1
        } else {
            return Err("Unsupported option.".to_owned());
        };
        if index + 1 >= command.len() {
            return Err("Missing expiry value.".to_owned());
        }
        let ttl = parse_u64_token(command, index + 1)
            .filter(|value| *value > 0)
            .ok_or_else(|| "TTL must be a positive integer.".to_owned())?;
        ttl_millis = Some(ttl.saturating_mul(multiplier));
        index += 2;
    }
    Ok(WriteRequest::Set {
        key: token(command, 1),
        value: token(command, 2),
        ttl_millis,
    })
}

pub(super) fn parse_mset(command: &RedisCommand) -> Result<WriteRequest, String> {
    let Some(pairs) = tail_pairs(command, 1) else {
        return Err("An even number of key/value arguments is required.".to_owned());
    };
    Ok(WriteRequest::MSet { pairs })
}

pub(super) fn parse_hset(command: &RedisCommand) -> Result<WriteRequest, String> {
    Ok(WriteRequest::HSet {
        key: token(command, 1),
        field: token(command, 2),
        value: token(command, 3),
    })
}

pub(super) fn parse_hmset(command: &RedisCommand) -> Result<WriteRequest, String> {
    let Some(pairs) = tail_pairs(command, 2) else {
        return Err("An even number of field/value arguments is required.".to_owned());
    };
    Ok(WriteRequest::HMSet {
        key: token(command, 1),
        pairs,
    })
}

pub(super) fn parse_hdel(command: &RedisCommand) -> Result<WriteRequest, String> {
    Ok(WriteRequest::HDel {
        key: token(command, 1),
        fields: tail_tokens(command, 2),
    })
}

pub(super) fn parse_sadd(command: &RedisCommand) -> Result<WriteRequest, String> {
    Ok(WriteRequest::SAdd {
        key: token(command, 1),
        members: tail_tokens(command, 2),
    })
}

pub(super) fn parse_srem(command: &RedisCommand) -> Result<WriteRequest, String> {
    Ok(WriteRequest::SRem {
        key: token(command, 1),
        members: tail_tokens(command, 2),
    })
}

pub(super) fn parse_getset(command: &RedisCommand) -> Result<WriteRequest, String> {
    Ok(WriteRequest::GetSet {
        key: token(command, 1),
        value: token(command, 2),
    })
}

pub(super) fn parse_append(command: &RedisCommand) -> Result<WriteRequest, String> {
    Ok(WriteRequest::Append {
        key: token(command, 1),
        suffix: token(command, 2),
    })
}

pub(super) fn parse_del(command: &RedisCommand) -> Result<WriteRequest, String> {
    Ok(WriteRequest::Del {
        key: token(command, 1),
    })
}

pub(super) fn parse_setrange(command: &RedisCommand) -> Result<WriteRequest, String> {
    let offset = parse_u64_token(command, 2)
        .and_then(|value| usize::try_from(value).ok())
        .ok_or_else(|| "Offset is not a non-negative integer.".to_owned())?;
    Ok(WriteRequest::SetRange {
        key: token(command, 1),
        offset,
        value: token(command, 3),
    })
}

pub(super) fn parse_incr(command: &RedisCommand) -> Result<WriteRequest, String> {
    Ok(WriteRequest::Incr {
        key: token(command, 1),
    })
}
