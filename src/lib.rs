//! EW 桌面智能助手核心
//!
//! 模块划分：
//! - **assistant**: 操作模型、风险分级、会话记录、意图服务（规则 / FastGPT）、操作中介
//! - **browser**: 标签存储、导航控制器、内容承载面（HTTP / Headless Chrome / Mock）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、状态投影、会话监管、外壳聚合与主控循环
//! - **observability**: tracing 日志初始化
//! - **systems**: 业务系统目录
//! - **ui**: Ratatui TUI 界面
//! - **voice**: 语音会话状态机与录音 / 识别 / 合成协作者

pub mod assistant;
pub mod browser;
pub mod config;
pub mod core;
pub mod observability;
pub mod systems;
pub mod ui;
pub mod voice;

pub use crate::core::{Command, Shell, ShellError, UiState};
