//! 重试退避策略

use std::time::Duration;

/// 计算第 `attempt` 次失败后的退避时长
///
/// 正常失败为 `base × (attempt + 1)`；
/// 限流失败（本地令牌桶拒绝或后端 429）加倍。
pub(crate) fn backoff_delay(base_delay_ms: u64, attempt: usize, rate_limited: bool) -> Duration {
    let multiplier = attempt as u64 + 1;
    let factor = if rate_limited { 2 } else { 1 };
    Duration::from_millis(base_delay_ms * multiplier * factor)
}
