//! spool-core
//!
//! Reliable work queue on top of a key-value store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, envelope, keys, errors）
//! - **ports**: 抽象化レイヤー（KeyValueStore, Script, Clock, IdGenerator）
//! - **queue**: キューエンジン（ReliableQueue, MessageQueue, アトミックスクリプト）
//! - **impls**: 実装（InMemoryStore、`redis` feature で RedisStore）
//! - **app**: バックグラウンド処理（ReaperLoop）

pub mod domain;
pub mod ports;
pub mod queue;
pub mod impls;
pub mod app;

pub use crate::app::ReaperLoop;
pub use crate::domain::{Envelope, ErrorKind, MessageId, QueueKeys, Result, SpoolError};
pub use crate::impls::InMemoryStore;
#[cfg(feature = "redis")]
pub use crate::impls::RedisStore;
pub use crate::ports::{Clock, KeyValueStore, SystemClock};
pub use crate::queue::{MessageQueue, Promotion, QueueConfig, QueueStats, ReliableQueue};
