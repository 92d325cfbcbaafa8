/// 日志工具模块
///
/// 提供 tracing 订阅器的初始化
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// # 参数
/// - `verbose`: 为 true 时默认级别为 debug，否则为 info；
///   `RUST_LOG` 环境变量优先。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // 重复初始化（例如测试里）直接忽略
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
