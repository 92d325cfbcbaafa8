//! # Doc Chat Client
//!
//! 面向文档问答后端的弹性请求编排客户端：把不可靠、受限流、
//! 可能缓慢的网络调用，变成可预期、可取消、去重的结果流。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `limiter` - 令牌桶准入控制，为出站请求限速
//! - `cache` - 带 TTL 的 LRU 缓存，避免重复的相同查询
//! - `queue` - 优先级请求队列，串行限速调度
//!
//! ### ② 模型层（Models）
//! - `models` - 后端接口 DTO 与规整后的响应形态
//! - `fingerprint` - 请求指纹（缓存键 + 取消标识）
//!
//! ### ③ 传输层（Clients）
//! - `clients` - `Transport` 抽象与 reqwest 实现，唯一接触网络的模块
//!
//! ### ④ 规整层（Normalizer）
//! - `normalizer` - 原始结果/失败 → 稳定内部形态，含合法性校验
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator` - 组合以上全部，外加重试退避与取消注册表

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod limiter;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod queue;
pub mod utils;

// 重新导出常用类型
pub use cache::TtlLruCache;
pub use clients::{HttpTransport, Transport};
pub use config::Config;
pub use error::{ApiError, ApiResult, ErrorCode, TransportError};
pub use fingerprint::RequestFingerprint;
pub use limiter::TokenBucket;
pub use models::{Conversation, FilePayload, NormalizedResponse, UploadSummary};
pub use orchestrator::RequestOrchestrator;
pub use queue::RequestQueue;
