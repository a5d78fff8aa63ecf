//! EW 桌面智能助手（终端外壳）
//!
//! 入口：初始化日志、创建外壳编排器与 TUI，并运行主循环。

use anyhow::Context;
use ew_agent::{core::create_shell, observability, ui::run_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖；TUI 运行时写入文件
    observability::init_for_tui().context("Failed to initialize logging")?;

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);

    // 创建外壳：返回命令发送端、状态接收端
    let (cmd_tx, state_rx) = create_shell(config_path)
        .await
        .context("Failed to create shell")?;

    // 启动 TUI 主循环（消费 state，向 cmd_tx 发送用户指令）
    run_app(state_rx, cmd_tx).await.context("App run failed")?;

    Ok(())
}
