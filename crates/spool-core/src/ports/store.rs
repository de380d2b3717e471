//! KeyValueStore port - 外部 key-value ストアへのインターフェース
//!
//! キューエンジンはこの trait だけに依存し、具体的なストア（Redis やインメモリ）には依存しません。
//!
//! # 提供するもの
//! - **Primitives**: アトミック単位の内側で使う同期プリミティブ
//!   （list / sorted set / hash / del）
//! - **Script**: 名前付きのアトミック遷移手続き。Lua 本体（スクリプト実行ホスト向け）と、
//!   Primitives に対して書かれたネイティブ手続き（自前のロックで実行するホスト向け）の両方を持つ
//! - **KeyValueStore**: エンジンが呼ぶ非同期インターフェース
//!
//! # 設計原則
//! - 複数ステップの状態遷移は必ず `eval` 1 回で実行（ストアが直列化を保証する）
//! - エンジン側ではロックを取らない

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failures reported by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached (connection refused, dropped, timed out).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected a command or a script failed.
    #[error("store operation failed: {0}")]
    OperationFailed(String),

    /// A script found entries that do not decode as envelopes.
    #[error("malformed entry: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Primitive operations available inside one atomic unit.
///
/// Semantics follow Redis: negative list and rank indices count from the tail,
/// sorted-set members are ordered by score then member bytes, `zadd` upserts,
/// and a structure left empty by a removal ceases to exist.
pub trait Primitives {
    /// Append `values` to the tail of a list. Returns the new length.
    fn rpush(&mut self, key: &str, values: &[String]) -> StoreResult<usize>;

    /// Read the inclusive index range `start..=stop` from a list.
    fn lrange(&mut self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    /// Keep only the inclusive index range `start..=stop` of a list.
    fn ltrim(&mut self, key: &str, start: i64, stop: i64) -> StoreResult<()>;

    fn llen(&mut self, key: &str) -> StoreResult<usize>;

    /// Remove occurrences of `value`: the first `count` from the head when positive, the
    /// last `-count` from the tail when negative, all of them when zero.
    fn lrem(&mut self, key: &str, count: i64, value: &str) -> StoreResult<usize>;

    /// Insert or update `(score, member)` pairs. Returns the number of new members.
    fn zadd(&mut self, key: &str, members: &[(f64, String)]) -> StoreResult<usize>;

    /// Members with score `<= max`, lowest score first.
    fn zrangebyscore(&mut self, key: &str, max: f64) -> StoreResult<Vec<String>>;

    /// Remove members by inclusive rank range. Returns the number removed.
    fn zremrangebyrank(&mut self, key: &str, start: i64, stop: i64) -> StoreResult<usize>;

    fn zrem(&mut self, key: &str, members: &[String]) -> StoreResult<usize>;

    fn zcard(&mut self, key: &str) -> StoreResult<usize>;

    /// Set `(field, value)` pairs. Returns the number of new fields.
    fn hset(&mut self, key: &str, pairs: &[(String, String)]) -> StoreResult<usize>;

    fn hmget(&mut self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<String>>>;

    fn hdel(&mut self, key: &str, fields: &[String]) -> StoreResult<usize>;

    fn hlen(&mut self, key: &str) -> StoreResult<usize>;

    /// Delete whole structures. Returns the number of keys that existed.
    fn del(&mut self, keys: &[String]) -> StoreResult<usize>;
}

/// Value returned by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    Integer(i64),
    Entries(Vec<String>),
}

/// Shape of the value a script returns (used by hosts that must decode a raw reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Integer,
    Entries,
}

impl ScriptReply {
    pub fn into_entries(self) -> StoreResult<Vec<String>> {
        match self {
            ScriptReply::Entries(entries) => Ok(entries),
            ScriptReply::Integer(n) => Err(StoreError::OperationFailed(format!(
                "expected entries from script, got integer {n}"
            ))),
        }
    }

    pub fn into_count(self) -> StoreResult<usize> {
        match self {
            ScriptReply::Integer(n) => usize::try_from(n).map_err(|_| {
                StoreError::OperationFailed(format!("script returned negative count {n}"))
            }),
            ScriptReply::Entries(_) => Err(StoreError::OperationFailed(
                "expected integer from script, got entries".to_string(),
            )),
        }
    }
}

/// Native body of a script: `(primitives, KEYS, ARGV) -> reply`.
pub type Procedure = fn(&mut dyn Primitives, &[String], &[String]) -> StoreResult<ScriptReply>;

/// A named atomic state transition.
///
/// `lua` and `procedure` implement the same transition; a host runs whichever it supports,
/// always as one indivisible unit.
#[derive(Clone, Copy)]
pub struct Script {
    name: &'static str,
    lua: &'static str,
    reply: ReplyKind,
    procedure: Procedure,
}

impl Script {
    pub const fn new(
        name: &'static str,
        lua: &'static str,
        reply: ReplyKind,
        procedure: Procedure,
    ) -> Self {
        Self {
            name,
            lua,
            reply,
            procedure,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn lua(&self) -> &'static str {
        self.lua
    }

    pub fn reply(&self) -> ReplyKind {
        self.reply
    }

    /// Run the native body. The caller must hold exclusive access to `ops` for the duration.
    pub fn run(
        &self,
        ops: &mut dyn Primitives,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        (self.procedure)(ops, keys, args)
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("reply", &self.reply)
            .finish_non_exhaustive()
    }
}

/// Store client consumed by the queue engine.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn rpush(&self, key: &str, values: &[String]) -> StoreResult<usize>;

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> StoreResult<usize>;

    /// Delete all `keys` in one atomic command.
    async fn del(&self, keys: &[String]) -> StoreResult<usize>;

    async fn llen(&self, key: &str) -> StoreResult<usize>;

    async fn zcard(&self, key: &str) -> StoreResult<usize>;

    async fn hlen(&self, key: &str) -> StoreResult<usize>;

    /// Execute `script` atomically with no interleaving from other clients.
    async fn eval(&self, script: &Script, keys: &[String], args: &[String])
    -> StoreResult<ScriptReply>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn rpush(&self, key: &str, values: &[String]) -> StoreResult<usize> {
        (**self).rpush(key, values).await
    }

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> StoreResult<usize> {
        (**self).zadd(key, members).await
    }

    async fn del(&self, keys: &[String]) -> StoreResult<usize> {
        (**self).del(keys).await
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        (**self).llen(key).await
    }

    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        (**self).zcard(key).await
    }

    async fn hlen(&self, key: &str) -> StoreResult<usize> {
        (**self).hlen(key).await
    }

    async fn eval(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        (**self).eval(script, keys, args).await
    }
}
