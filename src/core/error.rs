//! 外壳错误类型
//!
//! 所有错误都可恢复：编排器把它们投影为 UiState 的错误提示或一条助手消息，从不终止会话。

use thiserror::Error;

/// 外壳核心可能出现的错误（未知标签/确认、URL 校验、外部服务、资源冲突等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    /// 对未知标签或不存在的待确认操作进行操作
    #[error("Not found: {0}")]
    NotFound(String),

    /// URL 规范化后仍不可用；只影响对应标签的加载状态
    #[error("Invalid input: {0}")]
    Validation(String),

    /// 意图服务 / 语音识别 / 语音合成调用失败或超时
    #[error("{service} unavailable: {reason}")]
    TransientService { service: String, reason: String },

    /// 重复录音、提案进行中再次发送、待确认时发送新消息
    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    /// 麦克风不可用（无设备、权限被拒绝）
    #[error("Audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// 当前状态不接受该事件
    #[error("Cannot {event} while {state}")]
    InvalidTransition { state: String, event: String },

    #[error("Config error: {0}")]
    Config(String),
}

impl ShellError {
    pub fn transient(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientService {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// 是否应以「助手回复失败」的形式展示给用户（而非输入框错误）
    pub fn is_service_failure(&self) -> bool {
        matches!(self, Self::TransientService { .. })
    }
}

impl From<config::ConfigError> for ShellError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
