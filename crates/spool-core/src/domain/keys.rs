//! Structure names derived from a queue name.
//!
//! For a queue `Q`:
//! - main: `Q`
//! - delay schedule: `Q:delayed`
//! - ack index: `Q:ack`
//! - ack storage: `Q:ack:storage`

const DELAYED_SUFFIX: &str = ":delayed";
const ACK_SUFFIX: &str = ":ack";
const ACK_STORAGE_SUFFIX: &str = ":ack:storage";

/// The four store keys owned by one logical queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    /// FIFO list of encoded envelopes.
    pub main: String,
    /// Sorted set of encoded envelopes scored by ready-at time.
    pub delayed: String,
    /// Sorted set of in-flight message ids scored by ack deadline.
    pub ack_index: String,
    /// Hash of in-flight message id to encoded envelope.
    pub ack_storage: String,
}

impl QueueKeys {
    pub fn new(queue: &str) -> Self {
        Self {
            main: queue.to_string(),
            delayed: format!("{queue}{DELAYED_SUFFIX}"),
            ack_index: format!("{queue}{ACK_SUFFIX}"),
            ack_storage: format!("{queue}{ACK_STORAGE_SUFFIX}"),
        }
    }

    /// All four keys, main first.
    pub fn all(&self) -> Vec<String> {
        vec![
            self.main.clone(),
            self.delayed.clone(),
            self.ack_index.clone(),
            self.ack_storage.clone(),
        ]
    }
}
