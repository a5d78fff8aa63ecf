//! 可观测性
//!
//! TUI 占用终端，日志默认写入 logs/ew-agent.log；设置 EW_LOG_STDERR 时改写到 stderr。

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE: &str = "logs/ew-agent.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 日志写到 stderr（测试或无界面运行）
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// TUI 运行时的日志初始化
pub fn init_for_tui() -> anyhow::Result<()> {
    if std::env::var_os("EW_LOG_STDERR").is_some() {
        init();
        return Ok(());
    }
    let path = Path::new(LOG_FILE);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init();
    Ok(())
}
