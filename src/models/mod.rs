//! 数据模型 - 模型层
//!
//! 后端接口的原始 DTO 与规整后的响应形态。
//! 原始传输载荷只在传输层和规整层之间流动，绝不直接返回给调用方。

use serde::{Deserialize, Serialize};

/// 规整后的响应
///
/// 调用方唯一会看到的响应形态。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedResponse {
    /// 一次完整的问答响应
    Completion {
        content: String,
        /// 响应产生时间（毫秒时间戳）
        timestamp: i64,
        /// 查询发出时间（后端返回时透传）
        query_timestamp: Option<i64>,
    },
    /// 流式响应的一个分片
    StreamChunk {
        content: String,
        /// 为 true 时表示流结束的哨兵分片
        done: bool,
        timestamp: i64,
    },
}

impl NormalizedResponse {
    /// 取出文本内容（流结束哨兵为空串）
    pub fn content(&self) -> &str {
        match self {
            NormalizedResponse::Completion { content, .. } => content,
            NormalizedResponse::StreamChunk { content, .. } => content,
        }
    }
}

/// POST /query 请求体
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// POST /query 原始响应
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub response_timestamp: Option<i64>,
    #[serde(default)]
    pub query_timestamp: Option<i64>,
}

/// 流式端点的原始分片
#[derive(Debug, Clone, Deserialize)]
pub struct RawChunk {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// 待上传的文件载荷
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl FilePayload {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }
}

/// POST /upload 原始响应
///
/// 部分后端版本只返回 `message` 不返回 `summary`，
/// 规整时以 `message` 兜底。
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 上传完成后的规整摘要
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub summary: String,
    pub conversation_id: Option<String>,
    pub timestamp: i64,
}

/// 会话对象（GET /conversation/{id} 与 GET /conversations）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}
