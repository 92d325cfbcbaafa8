//! 响应规整层
//!
//! 把传输层的原始结果/失败转换为稳定的内部形态并做合法性校验。
//! 错误分类是一张固定的判定表，键为传输失败的状态/类别。

use chrono::Utc;

use crate::error::{messages, ApiError, ErrorCode, TransportError};
use crate::models::{NormalizedResponse, QueryResponse, RawChunk};

/// 规整一次完整的问答响应
pub fn transform_response(raw: &QueryResponse) -> NormalizedResponse {
    NormalizedResponse::Completion {
        content: raw.response.clone().unwrap_or_default(),
        timestamp: raw
            .response_timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis()),
        query_timestamp: raw.query_timestamp,
    }
}

/// 规整一个流式分片
pub fn transform_chunk(raw: &RawChunk) -> NormalizedResponse {
    if raw.done {
        return NormalizedResponse::StreamChunk {
            content: String::new(),
            done: true,
            timestamp: Utc::now().timestamp_millis(),
        };
    }
    NormalizedResponse::StreamChunk {
        content: raw.content.clone().unwrap_or_default(),
        done: false,
        timestamp: Utc::now().timestamp_millis(),
    }
}

/// 规整一个传输失败
///
/// 判定表：
/// - 取消           → REQUEST_CANCELLED
/// - HTTP 429       → RATE_LIMIT_EXCEEDED
/// - HTTP 400       → INVALID_REQUEST
/// - HTTP 5xx       → SERVER_ERROR
/// - 超时           → TIMEOUT
/// - 其余           → NETWORK_ERROR（保留原始消息）
pub fn transform_error(err: &TransportError) -> ApiError {
    match err {
        TransportError::Cancelled => ApiError::cancelled(),
        TransportError::Status { status: 429, .. } => {
            ApiError::new(ErrorCode::RateLimitExceeded, messages::RATE_LIMIT).with_status(429)
        }
        TransportError::Status { status: 400, .. } => {
            ApiError::new(ErrorCode::InvalidRequest, messages::INVALID_REQUEST).with_status(400)
        }
        TransportError::Status { status, .. } if (500..=599).contains(status) => {
            ApiError::new(ErrorCode::ServerError, messages::SERVER_ERROR).with_status(*status)
        }
        TransportError::Status { status, message } => {
            let message = if message.is_empty() {
                messages::NETWORK_ERROR.to_string()
            } else {
                message.clone()
            };
            ApiError::new(ErrorCode::NetworkError, message).with_status(*status)
        }
        TransportError::Timeout => ApiError::new(ErrorCode::Timeout, messages::TIMEOUT_ERROR),
        TransportError::Network(message) => {
            let message = if message.is_empty() {
                messages::NETWORK_ERROR.to_string()
            } else {
                message.clone()
            };
            ApiError::network(message)
        }
    }
}

/// 校验规整后的响应
///
/// - 完整响应：内容非空才合法；
/// - 流式分片：`done` 为 true，或内容非空才合法
///   （只有终止分片允许携带空内容）。
pub fn validate(response: &NormalizedResponse) -> bool {
    match response {
        NormalizedResponse::Completion { content, .. } => !content.is_empty(),
        NormalizedResponse::StreamChunk { content, done, .. } => *done || !content.is_empty(),
    }
}
