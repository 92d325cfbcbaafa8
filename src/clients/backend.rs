//! 后端 API 客户端 - 传输层
//!
//! `Transport` 是传输边界的抽象（测试中以桩实现替换），
//! `HttpTransport` 是面向真实后端的 reqwest 实现。
//! 所有调用都响应取消信号；失败以 `TransportError` 原始形态返回，
//! 由上层的规整层统一转换。

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::models::{Conversation, FilePayload, QueryRequest, QueryResponse, RawChunk, UploadResponse};
use crate::utils::sanitize;

/// NDJSON 流式分片解码器
///
/// 按行切分字节流并解析为 `RawChunk`。行可能跨多次读取到达，
/// 终止分片也可能缺少末尾换行，响应体结束时须经 `finish` 冲刷。
struct ChunkDecoder {
    buffer: String,
}

impl ChunkDecoder {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// 喂入一段字节，返回其中所有完整行解析出的分片
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<RawChunk, TransportError>> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);
            if line.is_empty() {
                continue;
            }
            chunks.push(Self::decode_line(&line));
        }
        chunks
    }

    /// 冲刷残余缓冲中没有换行符的最后一行
    fn finish(&mut self) -> Option<Result<RawChunk, TransportError>> {
        let line = self.buffer.trim().to_string();
        self.buffer.clear();
        if line.is_empty() {
            None
        } else {
            Some(Self::decode_line(&line))
        }
    }

    fn decode_line(line: &str) -> Result<RawChunk, TransportError> {
        // 先剔除字符串值里未转义的控制字节，再交给 serde
        let cleaned = sanitize::strip_control_chars(line);
        serde_json::from_str::<RawChunk>(&cleaned)
            .map_err(|e| TransportError::Network(format!("无法解析流式分片: {}", e)))
    }
}

/// 流式分片的接收端：传输层生产，编排层消费
pub type ChunkReceiver = mpsc::Receiver<Result<RawChunk, TransportError>>;

/// 传输边界
#[async_trait]
pub trait Transport: Send + Sync {
    /// 提交一次完整查询
    async fn query(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<QueryResponse, TransportError>;

    /// 建立一次流式查询，返回分片通道
    async fn stream_query(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkReceiver, TransportError>;

    /// 上传文件
    async fn upload(
        &self,
        file: FilePayload,
        conversation_id: Option<String>,
    ) -> Result<UploadResponse, TransportError>;

    /// 获取单个会话
    async fn get_conversation(&self, conversation_id: &str)
        -> Result<Conversation, TransportError>;

    /// 获取全部会话
    async fn list_conversations(&self) -> Result<Vec<Conversation>, TransportError>;
}

/// 面向真实后端的 HTTP 传输实现
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// 创建 HTTP 传输
    ///
    /// 超时在客户端级别统一设置（默认 300 秒）。
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 检查响应状态，非 2xx 转换为 `TransportError::Status`
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn query(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<QueryResponse, TransportError> {
        let call = async {
            let response = self
                .client
                .post(self.url("/query"))
                .json(&request)
                .send()
                .await?;
            let response = Self::check_status(response).await?;
            let body: QueryResponse = response.json().await?;
            Ok(body)
        };

        tokio::select! {
            result = call => result,
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
        }
    }

    async fn stream_query(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkReceiver, TransportError> {
        let establish = async {
            let response = self
                .client
                .post(self.url("/query/stream"))
                .json(&request)
                .send()
                .await?;
            Self::check_status(response).await
        };

        let response = tokio::select! {
            result = establish => result?,
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
        };

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = ChunkDecoder::new();
            loop {
                let next = tokio::select! {
                    next = body.next() => next,
                    _ = cancel.cancelled() => {
                        let _ = tx.send(Err(TransportError::Cancelled)).await;
                        return;
                    }
                };
                let bytes = match next {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(TransportError::from(e))).await;
                        return;
                    }
                    // 响应体结束：终止分片可能缺少末尾换行，须冲刷缓冲
                    None => {
                        if let Some(result) = decoder.finish() {
                            let _ = tx.send(result).await;
                        }
                        return;
                    }
                };
                for result in decoder.feed(&bytes) {
                    match result {
                        Ok(chunk) => {
                            let done = chunk.done;
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("流式分片解析失败: {}", e);
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }
        });

        debug!("流式连接已建立");
        Ok(rx)
    }

    async fn upload(
        &self,
        file: FilePayload,
        conversation_id: Option<String>,
    ) -> Result<UploadResponse, TransportError> {
        let part = reqwest::multipart::Part::bytes(file.content).file_name(file.file_name);
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(id) = conversation_id {
            form = form.text("conversation_id", id);
        }

        let response = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: UploadResponse = response.json().await?;
        Ok(body)
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Conversation, TransportError> {
        let response = self
            .client
            .get(self.url(&format!("/conversation/{}", conversation_id)))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: Conversation = response.json().await?;
        Ok(body)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, TransportError> {
        let response = self.client.get(self.url("/conversations")).send().await?;
        let response = Self::check_status(response).await?;
        let body: Vec<Conversation> = response.json().await?;
        Ok(body)
    }
}
