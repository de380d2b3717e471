//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStore**: 開発用・テスト用の KeyValueStore
//! - **RedisStore**: 本番用の KeyValueStore（`redis` feature が必要）

pub mod inmem_store;
#[cfg(feature = "redis")]
pub mod redis_store;

// 主要な型を再エクスポート
pub use self::inmem_store::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis_store::RedisStore;
