//! 请求指纹
//!
//! 指纹有两种投影：
//! - `cache_key`：由查询前缀和流式标志确定性派生，相同查询必得相同键，
//!   供响应缓存使用；
//! - `request_id`：在缓存键之上附加提交时间与随机后缀，每次提交唯一，
//!   供取消注册表使用。
//!
//! 唯一性是尽力而为的，不做加密保证；相同查询文本的并发提交发生
//! 碰撞只影响缓存翻动，不影响正确性。

use chrono::Utc;
use sha2::{Digest, Sha256};

/// 查询前缀的最大长度（字符数）
const SNIPPET_LEN: usize = 50;

/// 请求指纹
#[derive(Debug, Clone)]
pub struct RequestFingerprint {
    query_snippet: String,
    streaming: bool,
    timestamp_ms: i64,
    nonce: u32,
}

impl RequestFingerprint {
    /// 为一次新的提交生成指纹
    pub fn new(query: &str, streaming: bool) -> Self {
        Self {
            query_snippet: snippet(query),
            streaming,
            timestamp_ms: Utc::now().timestamp_millis(),
            nonce: rand::random(),
        }
    }

    /// 本次提交的唯一标识，作为取消注册表的键
    pub fn request_id(&self) -> String {
        format!(
            "{}-{}-{:08x}",
            hash_key(&self.query_snippet, self.streaming),
            self.timestamp_ms,
            self.nonce
        )
    }

    /// 确定性缓存键：相同查询文本（前缀）与流式标志必得相同键
    pub fn cache_key(query: &str, streaming: bool) -> String {
        hash_key(&snippet(query), streaming)
    }
}

fn snippet(query: &str) -> String {
    query.chars().take(SNIPPET_LEN).collect()
}

fn hash_key(snippet: &str, streaming: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snippet.as_bytes());
    hasher.update([streaming as u8]);
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
