//! 编排器端到端行为测试
//!
//! 用桩传输替换真实后端，验证重试、缓存、限流、取消与流式交付。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use doc_chat_client::clients::{ChunkReceiver, Transport};
use doc_chat_client::error::TransportError;
use doc_chat_client::models::{
    Conversation, FilePayload, NormalizedResponse, QueryRequest, QueryResponse, RawChunk,
    UploadResponse,
};
use doc_chat_client::{Config, ErrorCode, RequestOrchestrator};

/// 桩传输的查询行为
enum QueryBehavior {
    /// 固定成功响应
    Succeed(String),
    /// 固定失败状态码
    Fail(u16),
    /// 阻塞直到被取消
    WaitForCancel,
}

struct MockTransport {
    behavior: QueryBehavior,
    chunks: Vec<RawChunk>,
    upload_has_summary: bool,
    query_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl MockTransport {
    fn new(behavior: QueryBehavior) -> Self {
        Self {
            behavior,
            chunks: Vec::new(),
            upload_has_summary: true,
            query_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    fn with_chunks(chunks: Vec<RawChunk>) -> Self {
        Self {
            behavior: QueryBehavior::Succeed(String::new()),
            chunks,
            upload_has_summary: true,
            query_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    /// 模拟只返回 message 不返回 summary 的老版本后端
    fn without_upload_summary(mut self) -> Self {
        self.upload_has_summary = false;
        self
    }

    fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn query(
        &self,
        _request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<QueryResponse, TransportError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            QueryBehavior::Succeed(content) => Ok(QueryResponse {
                response: Some(content.clone()),
                response_timestamp: Some(1_700_000_001_000),
                query_timestamp: Some(1_700_000_000_000),
            }),
            QueryBehavior::Fail(status) => Err(TransportError::Status {
                status: *status,
                message: String::new(),
            }),
            QueryBehavior::WaitForCancel => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
        }
    }

    async fn stream_query(
        &self,
        _request: QueryRequest,
        _cancel: CancellationToken,
    ) -> Result<ChunkReceiver, TransportError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn upload(
        &self,
        file: FilePayload,
        conversation_id: Option<String>,
    ) -> Result<UploadResponse, TransportError> {
        Ok(UploadResponse {
            summary: self
                .upload_has_summary
                .then(|| format!("{} 的摘要", file.file_name)),
            conversation_id,
            message: Some("File processed successfully".to_string()),
        })
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Conversation, TransportError> {
        Ok(Conversation {
            conversation_id: conversation_id.to_string(),
            files: Vec::new(),
            messages: Vec::new(),
            created_at: None,
            updated_at: None,
        })
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, TransportError> {
        Ok(Vec::new())
    }
}

fn orchestrator_with(
    config: Config,
    transport: MockTransport,
) -> (RequestOrchestrator, Arc<MockTransport>) {
    let transport = Arc::new(transport);
    let orchestrator = RequestOrchestrator::with_transport(config, transport.clone());
    (orchestrator, transport)
}

#[tokio::test(start_paused = true)]
async fn server_error_exhausts_exactly_max_retries() {
    let (orchestrator, transport) =
        orchestrator_with(Config::default(), MockTransport::new(QueryBehavior::Fail(500)));

    let err = orchestrator.send_query("什么是贫血？", None).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::ServerError);
    assert_eq!(err.status, Some(500));
    assert_eq!(transport.query_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn invalid_request_is_never_retried() {
    let (orchestrator, transport) =
        orchestrator_with(Config::default(), MockTransport::new(QueryBehavior::Fail(400)));

    let err = orchestrator.send_query("bad payload", None).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidRequest);
    assert_eq!(transport.query_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_query_never_reaches_transport() {
    let (orchestrator, transport) = orchestrator_with(
        Config::default(),
        MockTransport::new(QueryBehavior::Succeed("answer".to_string())),
    );

    let err = orchestrator.send_query("   ", None).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::ValidationError);
    assert_eq!(transport.query_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn identical_query_is_served_from_cache() {
    let (orchestrator, transport) = orchestrator_with(
        Config::default(),
        MockTransport::new(QueryBehavior::Succeed("固定回答".to_string())),
    );

    let first = orchestrator.send_query("hello", None).await.unwrap();
    let second = orchestrator.send_query("hello", None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.content(), "固定回答");
    assert_eq!(transport.query_calls(), 1);
    assert_eq!(orchestrator.cached_responses(), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_cache_forces_a_fresh_transport_call() {
    let (orchestrator, transport) = orchestrator_with(
        Config::default(),
        MockTransport::new(QueryBehavior::Succeed("回答".to_string())),
    );

    orchestrator.send_query("hello", None).await.unwrap();
    orchestrator.clear_cache();
    orchestrator.send_query("hello", None).await.unwrap();

    assert_eq!(transport.query_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn local_rate_limit_rejection_fails_fast_without_transport() {
    let config = Config {
        rate_capacity: 0,
        ..Config::default()
    };
    let (orchestrator, transport) = orchestrator_with(
        config,
        MockTransport::new(QueryBehavior::Succeed("unreachable".to_string())),
    );

    let err = orchestrator.send_query("hello", None).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::RateLimitExceeded);
    assert_eq!(transport.query_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_request_normalizes_to_request_cancelled() {
    let (orchestrator, transport) = orchestrator_with(
        Config::default(),
        MockTransport::new(QueryBehavior::WaitForCancel),
    );
    let orchestrator = Arc::new(orchestrator);

    let worker = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.send_query("慢查询", None).await })
    };

    // 等待请求注册为待决
    while orchestrator.pending_requests().is_empty() {
        tokio::task::yield_now().await;
    }
    let request_id = orchestrator.pending_requests().remove(0);

    assert!(orchestrator.cancel_request(&request_id));
    // 再次取消同一 ID 返回 false
    assert!(!orchestrator.cancel_request(&request_id));

    let err = worker.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::RequestCancelled);
    assert!(orchestrator.pending_requests().is_empty());
    assert_eq!(transport.query_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_drains_the_pending_registry() {
    let (orchestrator, _transport) = orchestrator_with(
        Config::default(),
        MockTransport::new(QueryBehavior::WaitForCancel),
    );
    let orchestrator = Arc::new(orchestrator);

    let workers: Vec<_> = (0..2)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.send_query(&format!("查询 {}", i), None).await
            })
        })
        .collect();

    while orchestrator.pending_requests().len() < 2 {
        tokio::task::yield_now().await;
    }

    orchestrator.cancel_all_requests();

    for worker in workers {
        let err = worker.await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::RequestCancelled);
    }
    assert!(orchestrator.pending_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn streaming_delivers_chunks_in_order_until_done() {
    let chunks = vec![
        RawChunk { content: Some("你好".to_string()), done: false },
        RawChunk { content: Some("，世界".to_string()), done: false },
        RawChunk { content: None, done: true },
    ];
    let (orchestrator, transport) = orchestrator_with(Config::default(), MockTransport::with_chunks(chunks));

    let received: Arc<Mutex<Vec<NormalizedResponse>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    orchestrator
        .send_streaming_query("流式问题", move |chunk| sink.lock().push(chunk), 0)
        .await
        .unwrap();

    let received = received.lock();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].content(), "你好");
    assert_eq!(received[1].content(), "，世界");
    assert!(matches!(
        received[2],
        NormalizedResponse::StreamChunk { done: true, .. }
    ));
    assert_eq!(transport.stream_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn streaming_queries_are_never_cached() {
    let chunks = vec![RawChunk { content: None, done: true }];
    let (orchestrator, transport) = orchestrator_with(
        Config::default(),
        MockTransport::with_chunks(chunks),
    );

    orchestrator
        .send_streaming_query("同一个问题", |_| {}, 0)
        .await
        .unwrap();
    orchestrator
        .send_streaming_query("同一个问题", |_| {}, 0)
        .await
        .unwrap();

    assert_eq!(transport.stream_calls(), 2);
    assert_eq!(orchestrator.cached_responses(), 0);
}

#[tokio::test(start_paused = true)]
async fn stream_closed_before_done_surfaces_network_error() {
    // 没有 done 哨兵就关闭通道
    let chunks = vec![RawChunk { content: Some("一半".to_string()), done: false }];
    let (orchestrator, _transport) =
        orchestrator_with(Config::default(), MockTransport::with_chunks(chunks));

    let err = orchestrator
        .send_streaming_query("中断的流", |_| {}, 0)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NetworkError);
}

#[tokio::test(start_paused = true)]
async fn upload_produces_normalized_summary() {
    let (orchestrator, _transport) = orchestrator_with(
        Config::default(),
        MockTransport::new(QueryBehavior::Succeed(String::new())),
    );

    let file = FilePayload::new("report.pdf", b"%PDF-1.4".to_vec());
    let summary = orchestrator.upload_file(file, Some("conv-1")).await.unwrap();

    assert_eq!(summary.summary, "report.pdf 的摘要");
    assert_eq!(summary.conversation_id.as_deref(), Some("conv-1"));
}

#[tokio::test(start_paused = true)]
async fn upload_summary_falls_back_to_backend_message() {
    let (orchestrator, _transport) = orchestrator_with(
        Config::default(),
        MockTransport::new(QueryBehavior::Succeed(String::new())).without_upload_summary(),
    );

    let file = FilePayload::new("notes.txt", b"hello".to_vec());
    let summary = orchestrator.upload_file(file, None).await.unwrap();

    assert_eq!(summary.summary, "File processed successfully");
    assert_eq!(summary.conversation_id, None);
}

#[tokio::test(start_paused = true)]
async fn conversation_lookup_passes_through_normalized() {
    let (orchestrator, _transport) = orchestrator_with(
        Config::default(),
        MockTransport::new(QueryBehavior::Succeed(String::new())),
    );

    let conversation = orchestrator.get_conversation("conv-42").await.unwrap();
    assert_eq!(conversation.conversation_id, "conv-42");
    assert!(orchestrator.list_conversations().await.unwrap().is_empty());
}
