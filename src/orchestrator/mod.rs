//! 请求编排器 - 编排层
//!
//! ## 职责
//!
//! 组合限流器、响应缓存、请求队列与重试策略，对外提供
//! 查询 / 流式查询 / 文件上传 / 会话读取 / 取消五类操作。
//!
//! ## 控制流
//!
//! 调用方 → `send_query` → 缓存查找（命中即返回）→ 令牌桶准入 →
//! 传输尝试 → 规整校验 → 失败则退避重试（有界）→ 成功写缓存并返回。
//! 流式提交绕过缓存，经请求队列串行限速调度，分片按到达顺序
//! 通过回调交付。
//!
//! ## 资源归属
//!
//! 缓存、令牌桶、待决请求注册表都由编排器实例独占持有，
//! 不使用进程级全局状态，多个实例可以共存（多租户或测试隔离）。

mod retry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::TtlLruCache;
use crate::clients::{ChunkReceiver, HttpTransport, Transport};
use crate::config::Config;
use crate::error::{messages, ApiError, ApiResult, ErrorCode};
use crate::fingerprint::RequestFingerprint;
use crate::limiter::TokenBucket;
use crate::models::{
    Conversation, FilePayload, NormalizedResponse, QueryRequest, UploadSummary,
};
use crate::normalizer;
use crate::queue::{QueueTask, RequestQueue};
use crate::utils::sanitize_query;

/// 请求编排器
pub struct RequestOrchestrator {
    inner: Arc<OrchestratorInner>,
    queue: RequestQueue<ApiResult<()>>,
}

struct OrchestratorInner {
    transport: Arc<dyn Transport>,
    config: Config,
    cache: Mutex<TtlLruCache<NormalizedResponse>>,
    bucket: Mutex<TokenBucket>,
    pending: Mutex<HashMap<String, CancellationToken>>,
}

impl RequestOrchestrator {
    /// 创建面向真实后端的编排器
    pub fn new(config: Config) -> ApiResult<Self> {
        let transport =
            HttpTransport::new(&config).map_err(|e| normalizer::transform_error(&e))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// 以自定义传输创建编排器（测试中注入桩实现）
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let queue = RequestQueue::new(Duration::from_millis(config.queue_pacing_ms));
        let inner = Arc::new(OrchestratorInner {
            transport,
            cache: Mutex::new(TtlLruCache::new(
                config.cache_capacity,
                Duration::from_millis(config.cache_ttl_ms),
            )),
            bucket: Mutex::new(TokenBucket::new(
                config.rate_capacity,
                config.rate_refill_per_sec,
            )),
            pending: Mutex::new(HashMap::new()),
            config,
        });
        Self { inner, queue }
    }

    /// 提交一次完整查询
    ///
    /// 空查询立即返回 VALIDATION_ERROR，不发起任何传输调用也不重试。
    /// 相同查询命中缓存时直接返回，不触碰令牌桶。
    pub async fn send_query(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> ApiResult<NormalizedResponse> {
        let query = sanitize_query(query);
        validate_query(&query)?;

        let cache_key = RequestFingerprint::cache_key(&query, false);
        if let Some(hit) = self.inner.cache.lock().get(&cache_key) {
            debug!("缓存命中，跳过传输调用");
            return Ok(hit);
        }

        let request = QueryRequest {
            query,
            conversation_id: conversation_id.map(str::to_string),
        };
        let response = self.inner.execute_with_retry(request).await?;
        self.inner.cache.lock().set(cache_key, response.clone());
        Ok(response)
    }

    /// 提交一次流式查询
    ///
    /// 永不缓存；经请求队列调度，同一时刻至多一路流式交换。
    /// 每个分片规整后按到达顺序交给 `on_chunk`，以 done 分片终止。
    /// 调用方主动取消不作为失败上报；其余耗尽重试的失败原样返回。
    pub async fn send_streaming_query(
        &self,
        query: &str,
        on_chunk: impl FnMut(NormalizedResponse) + Send + 'static,
        priority: i32,
    ) -> ApiResult<()> {
        let query = sanitize_query(query);
        validate_query(&query)?;

        let inner = self.inner.clone();
        let task: QueueTask<ApiResult<()>> =
            Box::pin(async move { inner.run_streaming(query, on_chunk).await });

        match self.queue.enqueue(priority, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if err.code == ErrorCode::RequestCancelled => {
                debug!("流式请求被调用方取消，不上报失败");
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ApiError::network("队列调度中断")),
        }
    }

    /// 上传文件
    ///
    /// 大而低频的操作：不限流、不缓存、单次尝试，
    /// 但结果和错误同样经过规整。
    pub async fn upload_file(
        &self,
        file: FilePayload,
        conversation_id: Option<&str>,
    ) -> ApiResult<UploadSummary> {
        info!("📤 上传文件: {}", file.file_name);
        let raw = self
            .inner
            .transport
            .upload(file, conversation_id.map(str::to_string))
            .await
            .map_err(|e| normalizer::transform_error(&e))?;
        info!("✓ 文件上传完成");
        Ok(UploadSummary {
            // 老版本后端只返回 message，不返回 summary
            summary: raw.summary.or(raw.message).unwrap_or_default(),
            conversation_id: raw.conversation_id,
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// 按 ID 获取会话
    pub async fn get_conversation(&self, conversation_id: &str) -> ApiResult<Conversation> {
        self.inner
            .transport
            .get_conversation(conversation_id)
            .await
            .map_err(|e| normalizer::transform_error(&e))
    }

    /// 获取全部会话
    pub async fn list_conversations(&self) -> ApiResult<Vec<Conversation>> {
        self.inner
            .transport
            .list_conversations()
            .await
            .map_err(|e| normalizer::transform_error(&e))
    }

    /// 取消指定请求
    ///
    /// # 返回
    /// 请求存在并被取消返回 true；未找到返回 false。
    pub fn cancel_request(&self, request_id: &str) -> bool {
        let token = self.inner.pending.lock().remove(request_id);
        match token {
            Some(token) => {
                token.cancel();
                info!("已取消请求: {}", request_id);
                true
            }
            None => false,
        }
    }

    /// 取消全部待决请求
    pub fn cancel_all_requests(&self) {
        let drained: Vec<(String, CancellationToken)> =
            self.inner.pending.lock().drain().collect();
        for (request_id, token) in drained {
            token.cancel();
            debug!("已取消请求: {}", request_id);
        }
    }

    /// 当前待决请求的 ID 列表
    pub fn pending_requests(&self) -> Vec<String> {
        self.inner.pending.lock().keys().cloned().collect()
    }

    /// 清空响应缓存
    pub fn clear_cache(&self) {
        self.inner.cache.lock().clear();
    }

    /// 当前缓存条目数
    pub fn cached_responses(&self) -> usize {
        self.inner.cache.lock().len()
    }
}

impl OrchestratorInner {
    /// 注册待决请求，执行有界重试，任意终局都从注册表移除
    async fn execute_with_retry(&self, request: QueryRequest) -> ApiResult<NormalizedResponse> {
        let fingerprint = RequestFingerprint::new(&request.query, false);
        let request_id = fingerprint.request_id();
        let cancel = CancellationToken::new();
        self.pending.lock().insert(request_id.clone(), cancel.clone());

        let result = self.attempt_loop(&request, &cancel).await;

        self.pending.lock().remove(&request_id);
        result
    }

    async fn attempt_loop(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<NormalizedResponse> {
        let max_retries = self.config.max_retries.max(1);
        let mut last_error = ApiError::network(messages::NETWORK_ERROR);

        for attempt in 0..max_retries {
            if cancel.is_cancelled() {
                return Err(ApiError::cancelled());
            }
            let error = match self.single_attempt(request, cancel).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            warn!("第 {}/{} 次请求失败: {}", attempt + 1, max_retries, error);

            if !error.code.is_retryable() {
                return Err(error);
            }
            let rate_limited = error.code == ErrorCode::RateLimitExceeded;
            last_error = error;

            if attempt + 1 < max_retries {
                let delay =
                    retry::backoff_delay(self.config.retry_base_delay_ms, attempt, rate_limited);
                debug!("退避 {:?} 后重试", delay);
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_error)
    }

    async fn single_attempt(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<NormalizedResponse> {
        // 准入检查：令牌桶拒绝视为本次尝试的限流失败，快速进入退避路径
        if !self.bucket.lock().try_consume() {
            return Err(ApiError::rate_limited());
        }

        let raw = self
            .transport
            .query(request.clone(), cancel.clone())
            .await
            .map_err(|e| normalizer::transform_error(&e))?;

        let normalized = normalizer::transform_response(&raw);
        if !normalizer::validate(&normalized) {
            // 空的完整响应按服务端错误处理，允许重试
            return Err(ApiError::new(ErrorCode::ServerError, messages::SERVER_ERROR));
        }
        Ok(normalized)
    }

    /// 流式任务主体：由请求队列调度执行
    async fn run_streaming(
        &self,
        query: String,
        mut on_chunk: impl FnMut(NormalizedResponse) + Send + 'static,
    ) -> ApiResult<()> {
        let fingerprint = RequestFingerprint::new(&query, true);
        let request_id = fingerprint.request_id();
        let cancel = CancellationToken::new();
        self.pending.lock().insert(request_id.clone(), cancel.clone());

        let request = QueryRequest {
            query,
            conversation_id: None,
        };
        let result = self.consume_stream(&request, &cancel, &mut on_chunk).await;

        self.pending.lock().remove(&request_id);
        result
    }

    async fn consume_stream(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
        on_chunk: &mut (impl FnMut(NormalizedResponse) + Send + 'static),
    ) -> ApiResult<()> {
        let mut receiver = self.establish_stream_with_retry(request, cancel).await?;

        // 重试只作用于建连；分片一旦开始流动，失败即终止本次流
        loop {
            match receiver.recv().await {
                None => {
                    return Err(ApiError::network("流在终止分片之前意外关闭"));
                }
                Some(Err(e)) => return Err(normalizer::transform_error(&e)),
                Some(Ok(raw)) => {
                    let chunk = normalizer::transform_chunk(&raw);
                    if !normalizer::validate(&chunk) {
                        debug!("忽略空的非终止分片");
                        continue;
                    }
                    let done = matches!(
                        chunk,
                        NormalizedResponse::StreamChunk { done: true, .. }
                    );
                    on_chunk(chunk);
                    if done {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn establish_stream_with_retry(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<ChunkReceiver> {
        let max_retries = self.config.max_retries.max(1);
        let mut last_error = ApiError::network(messages::NETWORK_ERROR);

        for attempt in 0..max_retries {
            if cancel.is_cancelled() {
                return Err(ApiError::cancelled());
            }
            let error = {
                if !self.bucket.lock().try_consume() {
                    ApiError::rate_limited()
                } else {
                    match self
                        .transport
                        .stream_query(request.clone(), cancel.clone())
                        .await
                    {
                        Ok(receiver) => return Ok(receiver),
                        Err(e) => normalizer::transform_error(&e),
                    }
                }
            };
            warn!("第 {}/{} 次建立流式连接失败: {}", attempt + 1, max_retries, error);

            if !error.code.is_retryable() {
                return Err(error);
            }
            let rate_limited = error.code == ErrorCode::RateLimitExceeded;
            last_error = error;

            if attempt + 1 < max_retries {
                let delay =
                    retry::backoff_delay(self.config.retry_base_delay_ms, attempt, rate_limited);
                debug!("退避 {:?} 后重试建连", delay);
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_error)
    }
}

/// 校验查询文本非空
fn validate_query(query: &str) -> ApiResult<()> {
    if query.trim().is_empty() {
        return Err(ApiError::validation());
    }
    Ok(())
}
