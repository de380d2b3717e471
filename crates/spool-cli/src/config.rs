use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spool_core::QueueConfig;
use tracing::info;

const DEFAULT_PATHS: [&str; 2] = ["spool.toml", "/etc/spool/spool.toml"];

/// spool.toml の中身
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolConfig {
    pub queue: QueueConfig,
    pub demo: DemoConfig,
}

/// デモ用の producer / consumer 設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub queue_name: String,
    pub messages: usize,
    /// 偶数番目のメッセージに付ける遅延（0 なら遅延なし）
    pub delay_ms: u64,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub redis_url: Option<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            queue_name: "spool-demo".to_string(),
            messages: 6,
            delay_ms: 500,
            batch_size: 4,
            poll_interval_ms: 200,
            redis_url: None,
        }
    }
}

/// 明示パス、なければ既定の場所から設定を読む。どこにもなければデフォルト。
pub fn load_config(explicit: Option<&Path>) -> Result<SpoolConfig, Box<dyn std::error::Error>> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => DEFAULT_PATHS.iter().map(PathBuf::from).collect(),
    };

    for path in &candidates {
        if explicit.is_none() && !path.exists() {
            continue;
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("error reading {}: {e}", path.display()))?;
        let config: SpoolConfig = toml::from_str(&contents)
            .map_err(|e| format!("error parsing {}: {e}", path.display()))?;
        config.queue.validate()?;
        info!(path = %path.display(), "loaded configuration");
        return Ok(config);
    }

    info!("no config file found, using defaults");
    Ok(SpoolConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: SpoolConfig = toml::from_str("").unwrap();
        assert_eq!(config, SpoolConfig::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: SpoolConfig = toml::from_str(
            r#"
            [queue]
            ack_timeout_ms = 2000

            [demo]
            queue_name = "mail"
            redis_url = "redis://127.0.0.1/"
            "#,
        )
        .unwrap();
        assert_eq!(config.queue.ack_timeout_ms, 2_000);
        assert_eq!(config.queue.promotion_batch_size, 100);
        assert_eq!(config.demo.queue_name, "mail");
        assert_eq!(config.demo.messages, 6);
        assert_eq!(config.demo.redis_url.as_deref(), Some("redis://127.0.0.1/"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/spool.toml"))).unwrap_err();
        assert!(err.to_string().contains("error reading"));
    }
}
