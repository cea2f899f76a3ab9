//! Farmtrack - 农场路线追踪
//!
//! 入口：加载配置、初始化日志、创建持久化网关并恢复状态，然后运行控制台主循环。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use farmtrack::{
    config::{load_config, AppConfig},
    core::Tracker,
    observability,
    storage::create_gateway,
    ui::{run_app, stdin_lines, StdinConfirm},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 可选参数：额外的配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (cfg, config_error) = match load_config(config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // 日志：默认取配置级别，可通过 RUST_LOG 覆盖
    observability::init(&cfg.logging.level);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    let _ = std::fs::create_dir_all(&cfg.app.data_dir);

    let gateway = create_gateway(&cfg.storage);
    let lines = stdin_lines();
    let confirm = Arc::new(StdinConfirm::new(lines.clone()));
    let tracker = Tracker::bootstrap(gateway, confirm).await;

    if let Some(name) = &cfg.app.name {
        println!("{}", name);
    }
    run_app(tracker, lines).await.context("Console run failed")?;

    Ok(())
}
