use serde::{Deserialize, Serialize};

/// Sizes of the four structures of one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Entries waiting in the main list.
    pub ready: usize,
    /// Entries waiting for their ready-at time.
    pub delayed: usize,
    /// Ids consumed with acknowledgement and not yet acknowledged.
    pub in_flight: usize,
    /// Envelopes kept for redelivery (mirrors `in_flight`).
    pub ack_storage: usize,
}

/// Outcome of one promotion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    /// Delayed entries moved to the main list.
    pub delayed: usize,
    /// Expired in-flight entries moved back to the main list.
    pub expired: usize,
}

impl Promotion {
    pub fn total(&self) -> usize {
        self.delayed + self.expired
    }
}
