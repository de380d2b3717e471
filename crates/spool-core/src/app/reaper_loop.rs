//! ReaperLoop - 遅延メッセージと ack 期限切れメッセージの定期回収
//!
//! エンジンは `consume` のついでにしか昇格を行いません。consume が来ない間も
//! 期限を過ぎたメッセージを main に戻しておきたい場合に、このループを併用します。
//!
//! # フロー
//! 1. `sweep_interval` ごとに `MessageQueue::promote()` を実行
//! 2. 失敗してもログを出して継続（ストア障害の回復は次の tick に任せる）
//! 3. shutdown シグナル（`watch::Sender` に true を送る or drop）で停止

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::Result;
use crate::queue::{MessageQueue, Promotion};

/// ReaperLoop は昇格スクリプトを定期的に実行する
pub struct ReaperLoop<Q: ?Sized> {
    queue: Arc<Q>,
    interval: Duration,
}

impl<Q: MessageQueue + ?Sized> ReaperLoop<Q> {
    pub fn new(queue: Arc<Q>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 1 回だけ昇格を実行
    pub async fn sweep_once(&self) -> Result<Promotion> {
        self.queue.promote().await
    }

    /// shutdown が通知されるまで昇格を繰り返す
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "reaper loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(promotion) if promotion.total() > 0 => {
                            debug!(
                                delayed = promotion.delayed,
                                expired = promotion.expired,
                                "reaper promoted messages"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "reaper sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("reaper loop stopped");
    }
}
