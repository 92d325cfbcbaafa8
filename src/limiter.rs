//! 令牌桶限流器 - 基础设施层
//!
//! 只负责"是否允许发起一次新的出站请求"的判定，
//! 不做任何 I/O，不关心调用方如何处理拒绝。

use std::time::Instant;

/// 令牌桶
///
/// 不变量：`0 <= tokens <= capacity` 恒成立。
/// 每次判定前先按流逝时间补充令牌（补满为止），再测试并消费。
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// 创建令牌桶
    ///
    /// # 参数
    /// - `capacity`: 桶容量（初始即为满桶）
    /// - `refill_per_sec`: 每秒补充的令牌数
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    /// 尝试消费一个令牌
    ///
    /// # 返回
    /// 成功消费返回 true；令牌不足返回 false，
    /// 调用方应视为可重试的限流条件，而非致命错误。
    pub fn try_consume(&mut self) -> bool {
        self.try_consume_at(Instant::now())
    }

    fn try_consume_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return true;
        }
        false
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity as f64);
        self.last_refill = now;
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(60, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn consumes_until_empty_then_rejects() {
        let mut bucket = TokenBucket::new(3, 0.0);
        let now = Instant::now();
        assert!(bucket.try_consume_at(now));
        assert!(bucket.try_consume_at(now));
        assert!(bucket.try_consume_at(now));
        assert!(!bucket.try_consume_at(now));
    }

    #[test]
    fn tokens_never_negative_never_exceed_capacity() {
        let mut bucket = TokenBucket::new(2, 10.0);
        let start = Instant::now();
        for i in 0..50 {
            let now = start + Duration::from_millis(i * 37);
            bucket.try_consume_at(now);
            assert!(bucket.tokens >= 0.0);
            assert!(bucket.tokens <= bucket.capacity as f64);
        }
    }

    #[test]
    fn refills_over_simulated_time() {
        // 默认配置：容量 60，每秒补充 1 个
        let mut bucket = TokenBucket::default();
        let start = Instant::now();
        // 排空
        for _ in 0..60 {
            assert!(bucket.try_consume_at(start));
        }
        assert!(!bucket.try_consume_at(start));
        // 10 秒后至少补回一个令牌
        assert!(bucket.try_consume_at(start + Duration::from_secs(10)));
    }

    #[test]
    fn refill_caps_at_capacity() {
        let mut bucket = TokenBucket::new(5, 100.0);
        let start = Instant::now();
        bucket.try_consume_at(start);
        bucket.refill(start + Duration::from_secs(3600));
        assert_eq!(bucket.tokens, 5.0);
    }
}
