mod config;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use spool_core::ports::UlidGenerator;
use spool_core::{
    Envelope, InMemoryStore, KeyValueStore, MessageQueue, ReaperLoop, ReliableQueue, SystemClock,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{SpoolConfig, load_config};

/// spool デモ: producer と ack 付き consumer を 1 プロセスで動かす
#[derive(Debug, Parser)]
#[command(name = "spool", version, about = "Reliable work queue demo")]
struct Args {
    /// 設定ファイル（省略時は ./spool.toml, /etc/spool/spool.toml の順に探す）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// キュー名
    #[arg(short, long)]
    queue: Option<String>,

    /// 投入するメッセージ数
    #[arg(short = 'n', long)]
    messages: Option<usize>,

    /// ack タイムアウト（ミリ秒）
    #[arg(long)]
    ack_timeout_ms: Option<u64>,

    /// Redis の URL（`redis` feature 付きビルドのみ）
    #[cfg(feature = "redis")]
    #[arg(long)]
    redis_url: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut SpoolConfig) {
        if let Some(queue) = &self.queue {
            config.demo.queue_name = queue.clone();
        }
        if let Some(messages) = self.messages {
            config.demo.messages = messages;
        }
        if let Some(ack_timeout_ms) = self.ack_timeout_ms {
            config.queue.ack_timeout_ms = ack_timeout_ms;
        }
        #[cfg(feature = "redis")]
        if let Some(url) = &self.redis_url {
            config.demo.redis_url = Some(url.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    #[cfg(feature = "redis")]
    if let Some(url) = config.demo.redis_url.clone() {
        let store = spool_core::RedisStore::connect(&url).await?;
        info!(%url, "using redis store");
        return run_demo(store, config).await;
    }

    info!("using in-memory store");
    run_demo(InMemoryStore::new(), config).await
}

async fn run_demo<S>(store: S, config: SpoolConfig) -> Result<(), Box<dyn std::error::Error>>
where
    S: KeyValueStore + 'static,
{
    let demo = config.demo.clone();
    let queue = Arc::new(ReliableQueue::new(store, &demo.queue_name, config.queue.clone())?);
    queue.flush().await?;

    // (A) 期限切れ ack の回収はバックグラウンドで
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = tokio::spawn(
        ReaperLoop::new(queue.clone(), config.queue.sweep_interval()).run(shutdown_rx),
    );

    // (B) 投入：偶数番目は遅延付き
    let ids = UlidGenerator::new(SystemClock);
    let delay = Duration::from_millis(demo.delay_ms);
    for seq in 0..demo.messages {
        let envelope =
            Envelope::generated_by(&ids, json!({ "seq": seq, "body": format!("hello #{seq}") }));
        let delay = if seq % 2 == 0 { delay } else { Duration::ZERO };
        queue.publish(&[envelope], delay).await?;
    }
    println!("published {} messages: {}", demo.messages, json!(queue.stats().await?));

    // (C) 消費：最初の 1 件だけ ack せずに落とし、再配送されることを見せる
    let mut acked = HashSet::new();
    let mut dropped_once = false;
    let poll = Duration::from_millis(demo.poll_interval_ms);
    let consume = async {
        while acked.len() < demo.messages {
            let batch = queue.consume(demo.batch_size, true).await?;
            let mut to_ack = Vec::with_capacity(batch.len());
            for envelope in batch {
                if !dropped_once {
                    dropped_once = true;
                    warn!(id = %envelope.id(), "simulating a crashed consumer, not acknowledging");
                    continue;
                }
                println!("received {} {}", envelope.id(), envelope.message());
                acked.insert(envelope.id().clone());
                to_ack.push(envelope);
            }
            queue.acknowledge(&to_ack).await?;
            if to_ack.is_empty() {
                tokio::time::sleep(poll).await;
            }
        }
        Ok::<_, spool_core::SpoolError>(())
    };

    tokio::select! {
        result = consume => result?,
        _ = tokio::signal::ctrl_c() => info!("received shutdown signal"),
    }

    println!("final stats: {}", json!(queue.stats().await?));

    let _ = shutdown_tx.send(true);
    reaper.await?;
    queue.flush().await?;
    Ok(())
}
