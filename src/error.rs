//! 错误类型定义
//!
//! 对外只暴露封闭的 `ApiError` 形态：稳定的 `code` + 可读的 `message`。
//! 传输层的原始失败（`TransportError`）绝不会越过规整层泄露给调用方。

use std::fmt;

use chrono::Utc;

/// 面向用户的错误提示文案
pub mod messages {
    pub const NETWORK_ERROR: &str = "Network error occurred. Please check your connection.";
    pub const INVALID_REQUEST: &str = "Invalid request. Please check your input.";
    pub const SERVER_ERROR: &str = "Server error occurred. Please try again later.";
    pub const TIMEOUT_ERROR: &str = "Request timed out. Please try again.";
    pub const RATE_LIMIT: &str = "Rate limit exceeded. Please try again later.";
    pub const VALIDATION_ERROR: &str = "Invalid input data provided.";
    pub const CANCELLED: &str = "Request was cancelled";
}

/// 稳定的错误码集合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 调用方输入不合法，不重试，立即返回
    ValidationError,
    /// 本地令牌桶拒绝或后端 429，加倍退避后重试
    RateLimitExceeded,
    /// 后端 400，不重试
    InvalidRequest,
    /// 后端 5xx，标准退避后重试
    ServerError,
    /// 传输超时，重试
    Timeout,
    /// 调用方主动取消，不作为失败处理
    RequestCancelled,
    /// 其他传输失败的兜底分类，重试
    NetworkError,
}

impl ErrorCode {
    /// 返回稳定的字符串编码（与前端约定一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::RequestCancelled => "REQUEST_CANCELLED",
            ErrorCode::NetworkError => "NETWORK_ERROR",
        }
    }

    /// 该类错误是否允许进入重试路径
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ErrorCode::ValidationError | ErrorCode::InvalidRequest | ErrorCode::RequestCancelled
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 规整后的 API 错误
///
/// 调用方只会观察到这一种错误形态。
#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// 后端返回的 HTTP 状态码（如果有）
    pub status: Option<u16>,
    /// 错误产生时间（毫秒时间戳）
    pub timestamp: i64,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// 输入校验失败
    pub fn validation() -> Self {
        Self::new(ErrorCode::ValidationError, messages::VALIDATION_ERROR)
    }

    /// 本地令牌桶拒绝
    pub fn rate_limited() -> Self {
        Self::new(ErrorCode::RateLimitExceeded, messages::RATE_LIMIT)
    }

    /// 调用方主动取消
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::RequestCancelled, messages::CANCELLED)
    }

    /// 兜底的网络错误
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}] {} (HTTP {})", self.code, self.message, status),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// API 结果类型别名
pub type ApiResult<T> = Result<T, ApiError>;

/// 传输层的原始失败形态
///
/// 仅在 crate 内部流动，由规整层转换为 `ApiError`。
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 请求被取消
    #[error("请求已取消")]
    Cancelled,
    /// 后端返回了非 2xx 状态
    #[error("后端返回状态 {status}: {message}")]
    Status { status: u16, message: String },
    /// 传输超时
    #[error("请求超时")]
    Timeout,
    /// 其他网络失败
    #[error("网络错误: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout;
        }
        if let Some(status) = err.status() {
            return TransportError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        TransportError::Network(err.to_string())
    }
}
