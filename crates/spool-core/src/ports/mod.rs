//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! キューエンジンは外部ストア・時計・ID 生成をすべてここの trait 経由で受け取ります。
//!
//! # 設計原則
//! - 外部 key-value ストアが唯一の共有状態（正本）
//! - 複数構造にまたがる状態遷移の整合性は、ストアのアトミックなスクリプト実行だけで保証する
//! - テストでは InMemoryStore と ManualClock に差し替える

pub mod clock;
pub mod id_generator;
pub mod store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{
    KeyValueStore, Primitives, Procedure, ReplyKind, Script, ScriptReply, StoreError, StoreResult,
};
