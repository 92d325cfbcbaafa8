use anyhow::Result;
use tracing::info;

use doc_chat_client::{Config, RequestOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    doc_chat_client::utils::logging::init(config.verbose_logging);

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.is_empty() {
        eprintln!("用法: doc_chat_client <查询文本>");
        std::process::exit(1);
    }

    info!("🚀 向 {} 提交查询", config.base_url);
    let orchestrator = RequestOrchestrator::new(config)?;
    let response = orchestrator.send_query(&query, None).await?;

    println!("{}", response.content());
    Ok(())
}
