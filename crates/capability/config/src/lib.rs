//! 应用运行配置加载。
//!
//! - [`AppConfig`]：环境变量（`main` 中先由 dotenvy 加载 `.env`）
//! - [`load_channels`]：JSON 通道表 → 通道与点位映射

mod channels;

pub use channels::{ChannelDefaults, ChannelDefinition, load_channels, parse_channels};

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: String,
    pub key_prefix: String,
    pub channels_file: String,
    pub status_http_addr: String,
    pub poll_concurrency: usize,
    pub poll_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub publish_max_retries: u32,
    pub publish_backoff_ms: u64,
    pub publish_timeout_ms: u64,
    /// 0 表示不标记陈旧点位
    pub stale_after_misses: u32,
    pub rpc_max_frame_bytes: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let channels_file = env::var("EMS_CHANNELS_FILE")
            .map_err(|_| ConfigError::Missing("EMS_CHANNELS_FILE".to_string()))?;
        let redis_url =
            env::var("EMS_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let key_prefix = read_optional("EMS_KEY_PREFIX").unwrap_or_else(|| "comsrv".to_string());
        let status_http_addr = env::var("EMS_STATUS_HTTP_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:6000".to_string());
        let poll_concurrency = read_u64_with_default("EMS_POLL_CONCURRENCY", 8)?;
        if poll_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "EMS_POLL_CONCURRENCY".to_string(),
                "0".to_string(),
            ));
        }
        let poll_timeout_ms = read_positive_u64("EMS_POLL_TIMEOUT_MS", 10_000)?;
        let connect_timeout_ms = read_positive_u64("EMS_CONNECT_TIMEOUT_MS", 5_000)?;
        let read_timeout_ms = read_positive_u64("EMS_READ_TIMEOUT_MS", 3_000)?;
        let backoff_base_ms = read_positive_u64("EMS_BACKOFF_BASE_MS", 1_000)?;
        let backoff_max_ms =
            read_u64_with_default("EMS_BACKOFF_MAX_MS", 60_000)?.max(backoff_base_ms);
        let publish_max_retries = read_u32_with_default("EMS_PUBLISH_MAX_RETRIES", 3)?;
        let publish_backoff_ms = read_u64_with_default("EMS_PUBLISH_BACKOFF_MS", 100)?;
        let publish_timeout_ms = read_positive_u64("EMS_PUBLISH_TIMEOUT_MS", 2_000)?;
        let stale_after_misses = read_u32_with_default("EMS_STALE_AFTER_MISSES", 0)?;
        let rpc_max_frame_bytes = read_u64_with_default("EMS_RPC_MAX_FRAME_BYTES", 1_048_576)?;

        Ok(Self {
            redis_url,
            key_prefix,
            channels_file,
            status_http_addr,
            poll_concurrency: poll_concurrency as usize,
            poll_timeout_ms,
            connect_timeout_ms,
            read_timeout_ms,
            backoff_base_ms,
            backoff_max_ms,
            publish_max_retries,
            publish_backoff_ms,
            publish_timeout_ms,
            stale_after_misses,
            rpc_max_frame_bytes: rpc_max_frame_bytes as usize,
        })
    }

    /// 通道表中未指定时使用的超时。
    pub fn channel_defaults(&self) -> ChannelDefaults {
        ChannelDefaults {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

/// 适配器宿主进程配置。
#[derive(Debug, Clone)]
pub struct AdapterHostConfig {
    pub listen_addr: String,
    pub rpc_max_frame_bytes: usize,
}

impl AdapterHostConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = env::var("EMS_ADAPTER_HOST_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:7600".to_string());
        let rpc_max_frame_bytes = read_u64_with_default("EMS_RPC_MAX_FRAME_BYTES", 1_048_576)?;
        Ok(Self {
            listen_addr,
            rpc_max_frame_bytes: rpc_max_frame_bytes as usize,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
    }
    Ok(value)
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
