//! Atomic transition scripts.
//!
//! Each script exists twice: a Lua body for hosts with server-side scripting (Redis `EVAL`),
//! and a native procedure over [`Primitives`] for hosts that run it under their own lock.
//! Both read everything they need before the first write, so a failing argument aborts the
//! script with every structure untouched.
//!
//! The pop scripts screen the requested window before popping. Entries that do not decode
//! as envelopes are removed from the main list and the script fails with
//! [`StoreError::Malformed`]; the valid entries stay at the head for the next call.
//!
//! Timestamps are epoch milliseconds passed in ARGV; the store never reads its own clock.

use std::str::FromStr;

use crate::domain::Envelope;
use crate::ports::{Primitives, ReplyKind, Script, ScriptReply, StoreError, StoreResult};

/// KEYS: `[main]`, ARGV: `[quantity]`. Returns the popped entries.
pub const POP_BATCH: Script = Script::new(
    "pop_batch",
    POP_BATCH_LUA,
    ReplyKind::Entries,
    pop_batch,
);

/// KEYS: `[main, ack_index, ack_storage]`, ARGV: `[quantity, deadline, batch]`.
/// Returns the popped entries, each registered in the ack structures.
pub const POP_BATCH_WITH_ACK: Script = Script::new(
    "pop_batch_with_ack",
    POP_BATCH_WITH_ACK_LUA,
    ReplyKind::Entries,
    pop_batch_with_ack,
);

/// KEYS: `[delayed, main]`, ARGV: `[now, batch]`. Returns the number promoted.
pub const PROMOTE_DELAYED: Script = Script::new(
    "promote_delayed",
    PROMOTE_DELAYED_LUA,
    ReplyKind::Integer,
    promote_delayed,
);

/// KEYS: `[ack_index, ack_storage, main]`, ARGV: `[now, batch]`. Returns the number requeued.
pub const PROMOTE_EXPIRED_ACKS: Script = Script::new(
    "promote_expired_acks",
    PROMOTE_EXPIRED_ACKS_LUA,
    ReplyKind::Integer,
    promote_expired_acks,
);

/// KEYS: `[ack_index, ack_storage]`, ARGV: `[batch, id...]`. Returns the number of ids
/// that were still in flight.
pub const ACKNOWLEDGE: Script = Script::new(
    "acknowledge",
    ACKNOWLEDGE_LUA,
    ReplyKind::Integer,
    acknowledge,
);

const POP_BATCH_LUA: &str = r#"
local queue = KEYS[1]
local quantity = tonumber(ARGV[1])
if quantity == nil then
    return redis.error_reply('pop_batch: invalid quantity')
end
quantity = math.min(quantity, redis.call('llen', queue))
if quantity <= 0 then
    return {}
end

local messages = redis.call('lrange', queue, 0, quantity - 1)

local malformed = {}
for _, message in ipairs(messages) do
    local ok, decoded = pcall(cjson.decode, message)
    if not ok or type(decoded) ~= 'table' or type(decoded['id']) ~= 'string'
        or decoded['message'] == nil then
        table.insert(malformed, message)
    end
end
if #malformed > 0 then
    for _, message in ipairs(malformed) do
        redis.call('lrem', queue, 1, message)
    end
    return redis.error_reply('MALFORMED pop_batch: dropped ' .. #malformed
        .. ' undecodable entries from ' .. queue)
end

redis.call('ltrim', queue, quantity, -1)

return messages
"#;

const POP_BATCH_WITH_ACK_LUA: &str = r#"
local queue, ack_index, ack_storage = KEYS[1], KEYS[2], KEYS[3]
local quantity, deadline, batch = tonumber(ARGV[1]), ARGV[2], tonumber(ARGV[3])
if quantity == nil or tonumber(deadline) == nil or batch == nil or batch < 1 then
    return redis.error_reply('pop_batch_with_ack: invalid arguments')
end
quantity = math.min(quantity, redis.call('llen', queue))
if quantity <= 0 then
    return {}
end

local messages = redis.call('lrange', queue, 0, quantity - 1)
if #messages == 0 then
    return messages
end

-- Resolve every id before the first write.
local ids, malformed = {}, {}
for i, message in ipairs(messages) do
    local ok, decoded = pcall(cjson.decode, message)
    if ok and type(decoded) == 'table' and type(decoded['id']) == 'string'
        and decoded['message'] ~= nil then
        ids[i] = decoded['id']
    else
        table.insert(malformed, message)
    end
end
if #malformed > 0 then
    for _, message in ipairs(malformed) do
        redis.call('lrem', queue, 1, message)
    end
    return redis.error_reply('MALFORMED pop_batch_with_ack: dropped ' .. #malformed
        .. ' undecodable entries from ' .. queue)
end

redis.call('ltrim', queue, quantity, -1)

for i = 1, #messages, batch do
    local scored, fields = {}, {}
    for j = i, math.min(i + batch - 1, #messages) do
        table.insert(scored, deadline)
        table.insert(scored, ids[j])
        table.insert(fields, ids[j])
        table.insert(fields, messages[j])
    end
    redis.call('zadd', ack_index, unpack(scored))
    redis.call('hset', ack_storage, unpack(fields))
end

return messages
"#;

const PROMOTE_DELAYED_LUA: &str = r#"
local delayed, queue = KEYS[1], KEYS[2]
local now, batch = ARGV[1], tonumber(ARGV[2])
if tonumber(now) == nil or batch == nil or batch < 1 then
    return redis.error_reply('promote_delayed: invalid arguments')
end

local messages = redis.call('zrangebyscore', delayed, '-inf', now)
if #messages == 0 then
    return 0
end

redis.call('zremrangebyrank', delayed, 0, #messages - 1)
for i = 1, #messages, batch do
    redis.call('rpush', queue, unpack(messages, i, math.min(i + batch - 1, #messages)))
end

return #messages
"#;

const PROMOTE_EXPIRED_ACKS_LUA: &str = r#"
local ack_index, ack_storage, queue = KEYS[1], KEYS[2], KEYS[3]
local now, batch = ARGV[1], tonumber(ARGV[2])
if tonumber(now) == nil or batch == nil or batch < 1 then
    return redis.error_reply('promote_expired_acks: invalid arguments')
end

local ids = redis.call('zrangebyscore', ack_index, '-inf', now)
if #ids == 0 then
    return 0
end

redis.call('zremrangebyrank', ack_index, 0, #ids - 1)

local requeued = 0
for i = 1, #ids, batch do
    local chunk = {unpack(ids, i, math.min(i + batch - 1, #ids))}
    local stored = redis.call('hmget', ack_storage, unpack(chunk))
    redis.call('hdel', ack_storage, unpack(chunk))

    local messages = {}
    for j = 1, #chunk do
        if stored[j] then
            table.insert(messages, stored[j])
        end
    end
    if #messages > 0 then
        redis.call('rpush', queue, unpack(messages))
        requeued = requeued + #messages
    end
end

return requeued
"#;

const ACKNOWLEDGE_LUA: &str = r#"
local ack_index, ack_storage = KEYS[1], KEYS[2]
local batch = tonumber(ARGV[1])
if batch == nil or batch < 1 then
    return redis.error_reply('acknowledge: invalid arguments')
end

local removed = 0
for i = 2, #ARGV, batch do
    local chunk = {unpack(ARGV, i, math.min(i + batch - 1, #ARGV))}
    removed = removed + redis.call('zrem', ack_index, unpack(chunk))
    redis.call('hdel', ack_storage, unpack(chunk))
end

return removed
"#;

fn pop_batch(ops: &mut dyn Primitives, keys: &[String], args: &[String]) -> StoreResult<ScriptReply> {
    let queue = key(keys, 0)?;
    let quantity: i64 = arg(args, 0, "quantity")?;
    if quantity <= 0 {
        return Ok(ScriptReply::Entries(Vec::new()));
    }

    let messages = ops.lrange(queue, 0, quantity - 1)?;
    if let Err(malformed) = screen(&messages) {
        return drop_malformed(ops, "pop_batch", queue, &malformed);
    }
    ops.ltrim(queue, quantity, -1)?;

    Ok(ScriptReply::Entries(messages))
}

fn pop_batch_with_ack(
    ops: &mut dyn Primitives,
    keys: &[String],
    args: &[String],
) -> StoreResult<ScriptReply> {
    let queue = key(keys, 0)?;
    let ack_index = key(keys, 1)?;
    let ack_storage = key(keys, 2)?;
    let quantity: i64 = arg(args, 0, "quantity")?;
    let deadline: f64 = arg(args, 1, "deadline")?;
    let batch = batch_size(args, 2)?;
    if quantity <= 0 {
        return Ok(ScriptReply::Entries(Vec::new()));
    }

    let messages = ops.lrange(queue, 0, quantity - 1)?;
    if messages.is_empty() {
        return Ok(ScriptReply::Entries(messages));
    }

    let ids = match screen(&messages) {
        Ok(ids) => ids,
        Err(malformed) => return drop_malformed(ops, "pop_batch_with_ack", queue, &malformed),
    };

    ops.ltrim(queue, quantity, -1)?;

    for (chunk_ids, chunk_messages) in ids.chunks(batch).zip(messages.chunks(batch)) {
        let scored: Vec<(f64, String)> = chunk_ids.iter().map(|id| (deadline, id.clone())).collect();
        let fields: Vec<(String, String)> = chunk_ids
            .iter()
            .cloned()
            .zip(chunk_messages.iter().cloned())
            .collect();
        ops.zadd(ack_index, &scored)?;
        ops.hset(ack_storage, &fields)?;
    }

    Ok(ScriptReply::Entries(messages))
}

/// Ids of `messages` in order, or every entry that does not decode.
fn screen(messages: &[String]) -> Result<Vec<String>, Vec<&str>> {
    let mut ids = Vec::with_capacity(messages.len());
    let mut malformed = Vec::new();
    for raw in messages {
        match Envelope::decode(raw) {
            Ok(envelope) => ids.push(envelope.id().as_str().to_string()),
            Err(_) => malformed.push(raw.as_str()),
        }
    }
    if malformed.is_empty() { Ok(ids) } else { Err(malformed) }
}

/// Removes the first occurrence of each malformed entry from `queue` and fails the script.
fn drop_malformed(
    ops: &mut dyn Primitives,
    script: &str,
    queue: &str,
    malformed: &[&str],
) -> StoreResult<ScriptReply> {
    for raw in malformed {
        ops.lrem(queue, 1, raw)?;
    }
    Err(StoreError::Malformed(format!(
        "{script}: dropped {} undecodable entries from {queue}",
        malformed.len()
    )))
}

fn promote_delayed(
    ops: &mut dyn Primitives,
    keys: &[String],
    args: &[String],
) -> StoreResult<ScriptReply> {
    let delayed = key(keys, 0)?;
    let queue = key(keys, 1)?;
    let now: f64 = arg(args, 0, "now")?;
    let batch = batch_size(args, 1)?;

    let messages = ops.zrangebyscore(delayed, now)?;
    if messages.is_empty() {
        return Ok(ScriptReply::Integer(0));
    }

    ops.zremrangebyrank(delayed, 0, messages.len() as i64 - 1)?;
    for chunk in messages.chunks(batch) {
        ops.rpush(queue, chunk)?;
    }

    Ok(ScriptReply::Integer(messages.len() as i64))
}

fn promote_expired_acks(
    ops: &mut dyn Primitives,
    keys: &[String],
    args: &[String],
) -> StoreResult<ScriptReply> {
    let ack_index = key(keys, 0)?;
    let ack_storage = key(keys, 1)?;
    let queue = key(keys, 2)?;
    let now: f64 = arg(args, 0, "now")?;
    let batch = batch_size(args, 1)?;

    let ids = ops.zrangebyscore(ack_index, now)?;
    if ids.is_empty() {
        return Ok(ScriptReply::Integer(0));
    }

    ops.zremrangebyrank(ack_index, 0, ids.len() as i64 - 1)?;

    let mut requeued = 0;
    for chunk in ids.chunks(batch) {
        // Ids whose storage entry vanished have nothing left to redeliver.
        let messages: Vec<String> = ops.hmget(ack_storage, chunk)?.into_iter().flatten().collect();
        ops.hdel(ack_storage, chunk)?;
        if !messages.is_empty() {
            ops.rpush(queue, &messages)?;
            requeued += messages.len();
        }
    }

    Ok(ScriptReply::Integer(requeued as i64))
}

fn acknowledge(ops: &mut dyn Primitives, keys: &[String], args: &[String]) -> StoreResult<ScriptReply> {
    let ack_index = key(keys, 0)?;
    let ack_storage = key(keys, 1)?;
    let batch = batch_size(args, 0)?;

    let mut removed = 0;
    for chunk in args[1..].chunks(batch) {
        removed += ops.zrem(ack_index, chunk)?;
        ops.hdel(ack_storage, chunk)?;
    }

    Ok(ScriptReply::Integer(removed as i64))
}

fn key(keys: &[String], index: usize) -> StoreResult<&str> {
    keys.get(index)
        .map(String::as_str)
        .ok_or_else(|| StoreError::OperationFailed(format!("missing KEYS[{}]", index + 1)))
}

fn arg<T: FromStr>(args: &[String], index: usize, name: &str) -> StoreResult<T> {
    let raw = args
        .get(index)
        .ok_or_else(|| StoreError::OperationFailed(format!("missing argument `{name}`")))?;
    raw.parse()
        .map_err(|_| StoreError::OperationFailed(format!("invalid argument `{name}`: {raw}")))
}

fn batch_size(args: &[String], index: usize) -> StoreResult<usize> {
    match arg::<usize>(args, index, "batch")? {
        0 => Err(StoreError::OperationFailed(
            "invalid argument `batch`: must be at least 1".to_string(),
        )),
        batch => Ok(batch),
    }
}
