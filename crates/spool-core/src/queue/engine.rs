//! Queue engine backed by an external key-value store.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::scripts::{ACKNOWLEDGE, POP_BATCH, POP_BATCH_WITH_ACK, PROMOTE_DELAYED, PROMOTE_EXPIRED_ACKS};
use super::{MessageQueue, Promotion, QueueConfig, QueueStats};
use crate::domain::{Envelope, QueueKeys, Result, SpoolError};
use crate::ports::{Clock, KeyValueStore, SystemClock};

/// A FIFO queue with delayed delivery and ack-timeout redelivery.
///
/// The engine holds no mutable state of its own; every transition touching more than one
/// structure runs as a single store script, so any number of `ReliableQueue` instances
/// (in any number of processes) may share the same queue name.
pub struct ReliableQueue<S, C = SystemClock> {
    store: S,
    clock: C,
    keys: QueueKeys,
    config: QueueConfig,
}

impl<S: KeyValueStore> ReliableQueue<S> {
    pub fn new(store: S, name: &str, config: QueueConfig) -> Result<Self> {
        Self::with_clock(store, name, config, SystemClock)
    }
}

impl<S: KeyValueStore, C: Clock> ReliableQueue<S, C> {
    pub fn with_clock(store: S, name: &str, config: QueueConfig, clock: C) -> Result<Self> {
        if name.is_empty() {
            return Err(SpoolError::InvalidConfig("queue name must not be empty".to_string()));
        }
        config.validate()?;
        Ok(Self {
            store,
            clock,
            keys: QueueKeys::new(name),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.keys.main
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Epoch milliseconds `after` from now.
    fn score_after(&self, after: Duration) -> i64 {
        let offset = i64::try_from(after.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_millis().saturating_add(offset)
    }

    async fn pop(&self, quantity: usize, require_ack: bool) -> Result<Vec<String>> {
        // Scripts read the count as a signed 64-bit integer.
        let quantity = i64::try_from(quantity).unwrap_or(i64::MAX);
        let reply = if require_ack {
            let deadline = self.score_after(self.config.ack_timeout());
            self.store
                .eval(
                    &POP_BATCH_WITH_ACK,
                    &[
                        self.keys.main.clone(),
                        self.keys.ack_index.clone(),
                        self.keys.ack_storage.clone(),
                    ],
                    &[
                        quantity.to_string(),
                        deadline.to_string(),
                        self.config.promotion_batch_size.to_string(),
                    ],
                )
                .await?
        } else {
            self.store
                .eval(&POP_BATCH, &[self.keys.main.clone()], &[quantity.to_string()])
                .await?
        };
        Ok(reply.into_entries()?)
    }
}

#[async_trait]
impl<S: KeyValueStore, C: Clock> MessageQueue for ReliableQueue<S, C> {
    async fn publish(&self, envelopes: &[Envelope], delay: Duration) -> Result<()> {
        if envelopes.is_empty() {
            return Ok(());
        }
        let encoded = envelopes
            .iter()
            .map(Envelope::encode)
            .collect::<Result<Vec<_>>>()?;

        if delay.is_zero() {
            self.store.rpush(&self.keys.main, &encoded).await?;
            debug!(queue = %self.keys.main, count = encoded.len(), "published messages");
            return Ok(());
        }

        let ready_at = self.score_after(delay) as f64;
        let scored: Vec<(f64, String)> = encoded.into_iter().map(|raw| (ready_at, raw)).collect();
        self.store.zadd(&self.keys.delayed, &scored).await?;
        debug!(
            queue = %self.keys.main,
            count = scored.len(),
            delay_ms = delay.as_millis() as u64,
            "published delayed messages"
        );
        Ok(())
    }

    async fn consume(&self, quantity: usize, require_ack: bool) -> Result<Vec<Envelope>> {
        if quantity == 0 {
            return Ok(Vec::new());
        }

        self.promote().await?;

        let entries = self.pop(quantity, require_ack).await.inspect_err(|e| {
            if let SpoolError::MalformedEnvelope(reason) = e {
                warn!(queue = %self.keys.main, %reason, "dropped undecodable entries");
            }
        })?;
        let envelopes = entries
            .iter()
            .map(|raw| Envelope::decode(raw))
            .collect::<Result<Vec<_>>>()?;

        trace!(
            queue = %self.keys.main,
            requested = quantity,
            received = envelopes.len(),
            require_ack,
            "consumed messages"
        );
        Ok(envelopes)
    }

    async fn acknowledge(&self, envelopes: &[Envelope]) -> Result<()> {
        if envelopes.is_empty() {
            return Ok(());
        }

        let mut args = Vec::with_capacity(envelopes.len() + 1);
        args.push(self.config.promotion_batch_size.to_string());
        args.extend(envelopes.iter().map(|envelope| envelope.id().to_string()));

        let removed = self
            .store
            .eval(
                &ACKNOWLEDGE,
                &[self.keys.ack_index.clone(), self.keys.ack_storage.clone()],
                &args,
            )
            .await?
            .into_count()?;

        debug!(
            queue = %self.keys.main,
            requested = envelopes.len(),
            removed,
            "acknowledged messages"
        );
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let removed = self.store.del(&self.keys.all()).await?;
        debug!(queue = %self.keys.main, structures = removed, "flushed queue");
        Ok(())
    }

    async fn promote(&self) -> Result<Promotion> {
        let now = self.clock.now_millis().to_string();
        let batch = self.config.promotion_batch_size.to_string();

        let delayed = self
            .store
            .eval(
                &PROMOTE_DELAYED,
                &[self.keys.delayed.clone(), self.keys.main.clone()],
                &[now.clone(), batch.clone()],
            )
            .await?
            .into_count()?;

        let expired = self
            .store
            .eval(
                &PROMOTE_EXPIRED_ACKS,
                &[
                    self.keys.ack_index.clone(),
                    self.keys.ack_storage.clone(),
                    self.keys.main.clone(),
                ],
                &[now, batch],
            )
            .await?
            .into_count()?;

        let promotion = Promotion { delayed, expired };
        if promotion.total() > 0 {
            debug!(queue = %self.keys.main, delayed, expired, "promoted messages");
        }
        Ok(promotion)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let (ready, delayed, in_flight, ack_storage) = tokio::try_join!(
            self.store.llen(&self.keys.main),
            self.store.zcard(&self.keys.delayed),
            self.store.zcard(&self.keys.ack_index),
            self.store.hlen(&self.keys.ack_storage),
        )?;
        Ok(QueueStats {
            ready,
            delayed,
            in_flight,
            ack_storage,
        })
    }
}
