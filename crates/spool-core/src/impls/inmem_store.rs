//! InMemoryStore - 開発用・テスト用の key-value ストア
//!
//! # 実装詳細
//! - `HashMap<String, Structure>` でキーごとに list / sorted set / hash を管理
//! - 1 つの Mutex で全体を排他制御（`eval` はロックを保持したままスクリプトを実行する）
//! - 空になった構造は削除（Redis と同じ振る舞い）
//! - `set_offline(true)` で到達不能なストアを再現できる

use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ports::{KeyValueStore, Primitives, Script, ScriptReply, StoreError, StoreResult};

/// Sorted-set member ordered by score, then member bytes.
#[derive(Debug, Clone)]
struct Ranked {
    score: f64,
    member: String,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

#[derive(Debug, Clone, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    ordered: BTreeSet<Ranked>,
}

impl SortedSet {
    /// Returns true if `member` was not present before.
    fn insert(&mut self, score: f64, member: &str) -> bool {
        let previous = self.scores.insert(member.to_string(), score);
        if let Some(old) = previous {
            self.ordered.remove(&Ranked {
                score: old,
                member: member.to_string(),
            });
        }
        self.ordered.insert(Ranked {
            score,
            member: member.to_string(),
        });
        previous.is_none()
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&Ranked {
                    score,
                    member: member.to_string(),
                });
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.ordered.len()
    }
}

#[derive(Debug, Clone)]
enum Structure {
    List(VecDeque<String>),
    SortedSet(SortedSet),
    Hash(HashMap<String, String>),
}

impl Structure {
    fn is_empty(&self) -> bool {
        match self {
            Structure::List(list) => list.is_empty(),
            Structure::SortedSet(set) => set.len() == 0,
            Structure::Hash(hash) => hash.is_empty(),
        }
    }
}

/// Key space of the in-memory store.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    structures: HashMap<String, Structure>,
}

impl StoreState {
    fn list_mut(&mut self, key: &str) -> StoreResult<&mut VecDeque<String>> {
        let entry = self
            .structures
            .entry(key.to_string())
            .or_insert_with(|| Structure::List(VecDeque::new()));
        match entry {
            Structure::List(list) => Ok(list),
            _ => Err(wrong_type(key)),
        }
    }

    fn sorted_set_mut(&mut self, key: &str) -> StoreResult<&mut SortedSet> {
        let entry = self
            .structures
            .entry(key.to_string())
            .or_insert_with(|| Structure::SortedSet(SortedSet::default()));
        match entry {
            Structure::SortedSet(set) => Ok(set),
            _ => Err(wrong_type(key)),
        }
    }

    fn hash_mut(&mut self, key: &str) -> StoreResult<&mut HashMap<String, String>> {
        let entry = self
            .structures
            .entry(key.to_string())
            .or_insert_with(|| Structure::Hash(HashMap::new()));
        match entry {
            Structure::Hash(hash) => Ok(hash),
            _ => Err(wrong_type(key)),
        }
    }

    /// Drop `key` if the last operation left it empty.
    fn prune(&mut self, key: &str) {
        if self.structures.get(key).is_some_and(Structure::is_empty) {
            self.structures.remove(key);
        }
    }

    /// Run `op` against `key`, then prune it. Keeps a failed type check from leaving an
    /// empty structure behind.
    fn with_pruning<T>(
        &mut self,
        key: &str,
        op: impl FnOnce(&mut Self) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let result = op(self);
        self.prune(key);
        result
    }
}

impl Primitives for StoreState {
    fn rpush(&mut self, key: &str, values: &[String]) -> StoreResult<usize> {
        require_arguments("rpush", values.len())?;
        self.with_pruning(key, |state| {
            let list = state.list_mut(key)?;
            list.extend(values.iter().cloned());
            Ok(list.len())
        })
    }

    fn lrange(&mut self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.with_pruning(key, |state| {
            let list = state.list_mut(key)?;
            Ok(match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            })
        })
    }

    fn ltrim(&mut self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        self.with_pruning(key, |state| {
            let list = state.list_mut(key)?;
            match resolve_range(list.len(), start, stop) {
                Some((from, to)) => {
                    list.truncate(to + 1);
                    list.drain(..from);
                }
                None => list.clear(),
            }
            Ok(())
        })
    }

    fn llen(&mut self, key: &str) -> StoreResult<usize> {
        self.with_pruning(key, |state| Ok(state.list_mut(key)?.len()))
    }

    fn lrem(&mut self, key: &str, count: i64, value: &str) -> StoreResult<usize> {
        self.with_pruning(key, |state| {
            let list = state.list_mut(key)?;
            let limit = match count {
                0 => usize::MAX,
                n => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
            };
            let mut removed = 0;
            if count >= 0 {
                list.retain(|entry| {
                    let matched = removed < limit && entry == value;
                    removed += usize::from(matched);
                    !matched
                });
            } else {
                let mut kept: VecDeque<String> = VecDeque::with_capacity(list.len());
                while let Some(entry) = list.pop_back() {
                    if removed < limit && entry == value {
                        removed += 1;
                    } else {
                        kept.push_front(entry);
                    }
                }
                *list = kept;
            }
            Ok(removed)
        })
    }

    fn zadd(&mut self, key: &str, members: &[(f64, String)]) -> StoreResult<usize> {
        require_arguments("zadd", members.len())?;
        if members.iter().any(|(score, _)| score.is_nan()) {
            return Err(StoreError::OperationFailed(
                "ERR score is not a valid float".to_string(),
            ));
        }
        self.with_pruning(key, |state| {
            let set = state.sorted_set_mut(key)?;
            Ok(members
                .iter()
                .filter(|(score, member)| set.insert(*score, member))
                .count())
        })
    }

    fn zrangebyscore(&mut self, key: &str, max: f64) -> StoreResult<Vec<String>> {
        self.with_pruning(key, |state| {
            let set = state.sorted_set_mut(key)?;
            Ok(set
                .ordered
                .iter()
                .take_while(|ranked| ranked.score <= max)
                .map(|ranked| ranked.member.clone())
                .collect())
        })
    }

    fn zremrangebyrank(&mut self, key: &str, start: i64, stop: i64) -> StoreResult<usize> {
        self.with_pruning(key, |state| {
            let set = state.sorted_set_mut(key)?;
            let Some((from, to)) = resolve_range(set.len(), start, stop) else {
                return Ok(0);
            };
            let doomed: Vec<String> = set
                .ordered
                .iter()
                .skip(from)
                .take(to - from + 1)
                .map(|ranked| ranked.member.clone())
                .collect();
            for member in &doomed {
                set.remove(member);
            }
            Ok(doomed.len())
        })
    }

    fn zrem(&mut self, key: &str, members: &[String]) -> StoreResult<usize> {
        require_arguments("zrem", members.len())?;
        self.with_pruning(key, |state| {
            let set = state.sorted_set_mut(key)?;
            Ok(members.iter().filter(|member| set.remove(member)).count())
        })
    }

    fn zcard(&mut self, key: &str) -> StoreResult<usize> {
        self.with_pruning(key, |state| Ok(state.sorted_set_mut(key)?.len()))
    }

    fn hset(&mut self, key: &str, pairs: &[(String, String)]) -> StoreResult<usize> {
        require_arguments("hset", pairs.len())?;
        self.with_pruning(key, |state| {
            let hash = state.hash_mut(key)?;
            Ok(pairs
                .iter()
                .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
                .count())
        })
    }

    fn hmget(&mut self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<String>>> {
        require_arguments("hmget", fields.len())?;
        self.with_pruning(key, |state| {
            let hash = state.hash_mut(key)?;
            Ok(fields.iter().map(|field| hash.get(field).cloned()).collect())
        })
    }

    fn hdel(&mut self, key: &str, fields: &[String]) -> StoreResult<usize> {
        require_arguments("hdel", fields.len())?;
        self.with_pruning(key, |state| {
            let hash = state.hash_mut(key)?;
            Ok(fields.iter().filter(|field| hash.remove(*field).is_some()).count())
        })
    }

    fn hlen(&mut self, key: &str) -> StoreResult<usize> {
        self.with_pruning(key, |state| Ok(state.hash_mut(key)?.len()))
    }

    fn del(&mut self, keys: &[String]) -> StoreResult<usize> {
        require_arguments("del", keys.len())?;
        Ok(keys
            .iter()
            .filter(|key| self.structures.remove(key.as_str()).is_some())
            .count())
    }
}

/// InMemoryStore は開発用・テスト用の KeyValueStore
///
/// clone したインスタンスは同じキー空間を共有します（複数の producer / consumer を再現できる）。
///
/// # 使用例
/// ```ignore
/// let store = InMemoryStore::new();
/// let queue = ReliableQueue::new(store.clone(), "jobs", QueueConfig::default())?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 到達不能なストアを再現（true の間、すべての操作が `Unavailable` で失敗する）
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 存在するキーの一覧（テスト・デバッグ用）
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let state = self.lock()?;
        let mut keys: Vec<String> = state.structures.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreState>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn rpush(&self, key: &str, values: &[String]) -> StoreResult<usize> {
        self.lock()?.rpush(key, values)
    }

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> StoreResult<usize> {
        self.lock()?.zadd(key, members)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<usize> {
        self.lock()?.del(keys)
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        self.lock()?.llen(key)
    }

    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        self.lock()?.zcard(key)
    }

    async fn hlen(&self, key: &str) -> StoreResult<usize> {
        self.lock()?.hlen(key)
    }

    async fn eval(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        let mut state = self.lock()?;
        script.run(&mut *state, keys, args)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::OperationFailed(format!(
        "WRONGTYPE operation against key `{key}` holding the wrong kind of value"
    ))
}

fn require_arguments(command: &str, count: usize) -> StoreResult<()> {
    if count == 0 {
        return Err(StoreError::OperationFailed(format!(
            "ERR wrong number of arguments for '{command}' command"
        )));
    }
    Ok(())
}

/// Resolve a Redis-style inclusive index range against a structure of length `len`.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
