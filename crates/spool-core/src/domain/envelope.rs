//! Envelope - キューに載る 1 メッセージ
//!
//! Envelope は一意な id と不透明な payload（`message`）の組です。
//! 保存時・配送時のワイヤ形式は `{"id": ..., "message": ...}` の JSON です。
//!
//! # 不変条件
//! - id は生成後に変更されない
//! - 等価性は id のみで判定（payload は比較しない）

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::hash::{Hash, Hasher};

use super::errors::{Result, SpoolError};
use super::ids::MessageId;
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};

/// A message payload wrapped with its unique identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    id: MessageId,
    message: Value,
}

impl Envelope {
    /// Wrap `message` with a fresh ULID stamped with the system time.
    pub fn new(message: Value) -> Self {
        Self::generated_by(&UlidGenerator::new(SystemClock), message)
    }

    /// Wrap `message` with a caller-supplied id.
    pub fn with_id(message: Value, id: impl Into<MessageId>) -> Self {
        Self {
            id: id.into(),
            message,
        }
    }

    /// Wrap `message` with an id taken from `ids`.
    pub fn generated_by(ids: &dyn IdGenerator, message: Value) -> Self {
        Self {
            id: ids.generate_message_id(),
            message,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn message(&self) -> &Value {
        &self.message
    }

    /// Serialize to the wire format stored in every queue structure.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SpoolError::MalformedEnvelope(e.to_string()))
    }

    /// Parse the wire format. It must be a JSON object with a string `id` and a `message`.
    pub fn decode(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| SpoolError::MalformedEnvelope(e.to_string()))?;
        if !value.is_object() {
            return Err(SpoolError::MalformedEnvelope("expected a JSON object".to_string()));
        }
        serde_json::from_value(value).map_err(|e| SpoolError::MalformedEnvelope(e.to_string()))
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Envelope {}

impl Hash for Envelope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
