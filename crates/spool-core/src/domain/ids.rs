//! Message identifiers.
//!
//! # MessageId
//! Envelope の id は不透明な文字列です。呼び出し側が任意の id を渡すこともできるため、
//! 型としては ULID ではなく `String` を包む newtype にしています。
//!
//! 自動生成される id は ULID（時刻でソート可能・分散生成可能・128-bit）を文字列化したものです。
//! 生成は `ports::IdGenerator` 経由で差し替え可能です。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one message (the `id` field of the wire envelope).
///
/// 等価性・ハッシュは文字列そのもので判定します。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<Ulid> for MessageId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
