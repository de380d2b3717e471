//! Queue module: the engine, its configuration, and the atomic transition scripts.

mod config;
mod engine;
pub mod scripts;
mod stats;

pub use config::QueueConfig;
pub use engine::ReliableQueue;
pub use stats::{Promotion, QueueStats};

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{Envelope, Result};

/// Queue port (interface).
///
/// Design intent:
/// - Every operation is a non-blocking poll: a small constant number of store round trips.
/// - Promotion of due delayed messages and expired in-flight messages is lazy; it happens on
///   `consume` (or on an explicit `promote`), never on a timer inside the engine.
/// - Delivery is at-least-once when consuming with acknowledgement; duplicates are expected
///   after an ack deadline passes.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append `envelopes` in order. A non-zero `delay` holds them back until it elapses.
    async fn publish(&self, envelopes: &[Envelope], delay: Duration) -> Result<()>;

    async fn publish_now(&self, envelopes: &[Envelope]) -> Result<()> {
        self.publish(envelopes, Duration::ZERO).await
    }

    /// Take up to `quantity` envelopes from the head, oldest first.
    ///
    /// With `require_ack`, each returned envelope is redelivered after the ack timeout
    /// unless acknowledged first.
    async fn consume(&self, quantity: usize, require_ack: bool) -> Result<Vec<Envelope>>;

    /// Stop tracking `envelopes` for redelivery. Unknown ids are ignored.
    async fn acknowledge(&self, envelopes: &[Envelope]) -> Result<()>;

    /// Drop every structure of the queue.
    async fn flush(&self) -> Result<()>;

    /// Move due delayed and expired in-flight messages to the tail of the main list.
    async fn promote(&self) -> Result<Promotion>;

    /// Observability hook.
    async fn stats(&self) -> Result<QueueStats>;
}
