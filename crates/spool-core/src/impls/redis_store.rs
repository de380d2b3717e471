//! RedisStore - 本番用の KeyValueStore（`redis` feature）
//!
//! スクリプトは Lua 本体を `EVALSHA` で実行します（未登録なら `EVAL` にフォールバック）。
//! Redis はスクリプト実行中に他のクライアントのコマンドを挟まないため、
//! 各遷移はそのままアトミックになります。
//!
//! # 接続
//! - `MultiplexedConnection` を clone して使う（1 本の接続を複数タスクで共有）
//! - 再接続・リトライは行わない（失敗はそのまま呼び出し側へ）

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{FromRedisValue, RedisError, Value};

use crate::ports::{KeyValueStore, ReplyKind, Script, ScriptReply, StoreError, StoreResult};

/// RedisStore は Redis に対する KeyValueStore 実装
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// `redis://host:port/db` 形式の URL に接続
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(map_error)?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_error)?;
        Ok(Self { connection })
    }

    pub fn from_connection(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    async fn query<T: FromRedisValue>(&self, command: &redis::Cmd) -> StoreResult<T> {
        let mut connection = self.connection.clone();
        command.query_async(&mut connection).await.map_err(map_error)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn rpush(&self, key: &str, values: &[String]) -> StoreResult<usize> {
        self.query(redis::cmd("RPUSH").arg(key).arg(values)).await
    }

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> StoreResult<usize> {
        let mut command = redis::cmd("ZADD");
        command.arg(key);
        for (score, member) in members {
            command.arg(*score).arg(member);
        }
        self.query(&command).await
    }

    async fn del(&self, keys: &[String]) -> StoreResult<usize> {
        self.query(redis::cmd("DEL").arg(keys)).await
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        self.query(redis::cmd("LLEN").arg(key)).await
    }

    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        self.query(redis::cmd("ZCARD").arg(key)).await
    }

    async fn hlen(&self, key: &str) -> StoreResult<usize> {
        self.query(redis::cmd("HLEN").arg(key)).await
    }

    async fn eval(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        let lua = redis::Script::new(script.lua());
        let mut invocation = lua.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut connection = self.connection.clone();
        let value: Value = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(map_error)?;

        let reply = match script.reply() {
            ReplyKind::Integer => redis::from_redis_value::<i64>(&value).map(ScriptReply::Integer),
            ReplyKind::Entries => {
                redis::from_redis_value::<Vec<String>>(&value).map(ScriptReply::Entries)
            }
        };
        reply.map_err(|e| {
            StoreError::OperationFailed(format!("unexpected reply from `{}`: {e}", script.name()))
        })
    }
}

/// Error code the scripts raise when they drop undecodable entries.
const MALFORMED_CODE: &str = "MALFORMED";

fn map_error(err: RedisError) -> StoreError {
    if err.code() == Some(MALFORMED_CODE) {
        return StoreError::Malformed(err.detail().unwrap_or_default().to_string());
    }
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::OperationFailed(err.to_string())
    }
}
