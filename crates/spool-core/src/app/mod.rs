//! App - アプリケーション層
//!
//! このモジュールは、ports とキューエンジンを組み合わせたバックグラウンド処理を実装します。
//!
//! # 主要コンポーネント
//! - **ReaperLoop**: 遅延メッセージ・ack 期限切れメッセージの定期昇格

pub mod reaper_loop;

// 主要な型を再エクスポート
pub use self::reaper_loop::ReaperLoop;
