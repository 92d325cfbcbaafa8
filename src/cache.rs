//! TTL-LRU 响应缓存 - 基础设施层
//!
//! 以请求指纹为键，避免对后端重复发起完全相同的查询。
//! 过期条目在读取时惰性剔除；容量满时淘汰最久未使用的一条。

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

/// 缓存条目
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// 带 TTL 的 LRU 缓存
///
/// 访问顺序用一个独立的键序列维护（队尾为最近使用），
/// 与原始 Map 插入序语义等价。get/set 各自是一个完整的临界区，
/// 由持有者在外层加锁保证互斥。
#[derive(Debug)]
pub struct TtlLruCache<V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, CacheEntry<V>>,
    order: VecDeque<String>,
}

impl<V: Clone> TtlLruCache<V> {
    /// 创建缓存
    ///
    /// # 参数
    /// - `capacity`: 最大条目数
    /// - `ttl`: 条目存活时长
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// 读取缓存值
    ///
    /// 过期条目被剔除并返回 None；命中时刷新为最近使用。
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// 写入缓存值
    ///
    /// 新键导致超容时先淘汰最久未使用的一条；
    /// 覆盖已有键时同时刷新值和新鲜度。
    pub fn set(&mut self, key: String, value: V) {
        self.set_at(key, value, Instant::now())
    }

    /// 清空全部条目
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<V> {
        let expired = {
            let entry = self.entries.get(key)?;
            now.saturating_duration_since(entry.stored_at) > self.ttl
        };
        if expired {
            debug!("缓存条目已过期，剔除: {}", key);
            self.entries.remove(key);
            self.remove_from_order(key);
            return None;
        }
        let value = self.entries.get(key)?.value.clone();
        // 刷新最近使用位置
        self.remove_from_order(key);
        self.order.push_back(key.to_string());
        Some(value)
    }

    fn set_at(&mut self, key: String, value: V, now: Instant) {
        if self.entries.contains_key(&key) {
            self.remove_from_order(&key);
        } else if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                debug!("缓存已满，淘汰最久未使用条目: {}", oldest);
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, CacheEntry { value, stored_at: now });
    }

    fn remove_from_order(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}
