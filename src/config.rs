/// 程序配置文件
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

/// 客户端配置
///
/// 所有参数都是构造级别的，不依赖全局状态，
/// 因此可以同时存在多个独立配置的编排器实例。
#[derive(Clone, Debug)]
pub struct Config {
    /// 后端服务的基础 URL
    pub base_url: String,
    /// 请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 最大重试次数
    pub max_retries: usize,
    /// 重试基础延迟（毫秒）
    pub retry_base_delay_ms: u64,
    /// 令牌桶容量
    pub rate_capacity: u32,
    /// 令牌桶每秒补充速率
    pub rate_refill_per_sec: f64,
    /// 响应缓存容量（条目数）
    pub cache_capacity: usize,
    /// 响应缓存 TTL（毫秒）
    pub cache_ttl_ms: u64,
    /// 队列内部请求间隔（毫秒）
    pub queue_pacing_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_ms: 300_000,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            rate_capacity: 60,
            rate_refill_per_sec: 1.0,
            cache_capacity: 100,
            cache_ttl_ms: 3_600_000,
            queue_pacing_ms: 100,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            base_url: std::env::var("BACKEND_BASE_URL").unwrap_or(default.base_url),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_ms),
            max_retries: std::env::var("MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_retries),
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_base_delay_ms),
            rate_capacity: std::env::var("RATE_CAPACITY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.rate_capacity),
            rate_refill_per_sec: std::env::var("RATE_REFILL_PER_SEC").ok().and_then(|v| v.parse().ok()).unwrap_or(default.rate_refill_per_sec),
            cache_capacity: std::env::var("CACHE_CAPACITY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.cache_capacity),
            cache_ttl_ms: std::env::var("CACHE_TTL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.cache_ttl_ms),
            queue_pacing_ms: std::env::var("QUEUE_PACING_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.queue_pacing_ms),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }

    /// 从 TOML 文件加载配置
    ///
    /// 文件中未出现的字段保持默认值。
    pub fn from_toml_file(path: &str) -> ApiResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ApiError::network(format!("读取配置文件失败 ({}): {}", path, e)))?;
        let file: ConfigFile = toml::from_str(&raw)
            .map_err(|e| ApiError::network(format!("解析配置文件失败 ({}): {}", path, e)))?;
        Ok(file.merge(Self::default()))
    }
}

/// TOML 配置文件的可选字段表示
#[derive(Debug, Deserialize)]
struct ConfigFile {
    base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    max_retries: Option<usize>,
    retry_base_delay_ms: Option<u64>,
    rate_capacity: Option<u32>,
    rate_refill_per_sec: Option<f64>,
    cache_capacity: Option<usize>,
    cache_ttl_ms: Option<u64>,
    queue_pacing_ms: Option<u64>,
    verbose_logging: Option<bool>,
}

impl ConfigFile {
    fn merge(self, default: Config) -> Config {
        Config {
            base_url: self.base_url.unwrap_or(default.base_url),
            request_timeout_ms: self.request_timeout_ms.unwrap_or(default.request_timeout_ms),
            max_retries: self.max_retries.unwrap_or(default.max_retries),
            retry_base_delay_ms: self.retry_base_delay_ms.unwrap_or(default.retry_base_delay_ms),
            rate_capacity: self.rate_capacity.unwrap_or(default.rate_capacity),
            rate_refill_per_sec: self.rate_refill_per_sec.unwrap_or(default.rate_refill_per_sec),
            cache_capacity: self.cache_capacity.unwrap_or(default.cache_capacity),
            cache_ttl_ms: self.cache_ttl_ms.unwrap_or(default.cache_ttl_ms),
            queue_pacing_ms: self.queue_pacing_ms.unwrap_or(default.queue_pacing_ms),
            verbose_logging: self.verbose_logging.unwrap_or(default.verbose_logging),
        }
    }
}
