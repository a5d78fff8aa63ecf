//! 状态定义：UiState 投影
//!
//! UI 只持有轻量的 UiState（标签、对话、待确认、语音、锁、错误）；完整状态由 Shell 维护并投影到 UiState。

use serde::Serialize;

use crate::assistant::{Message, PendingConfirmation};
use crate::browser::{Tab, TabId};
use crate::systems::BusinessSystem;
use crate::voice::VoiceState;

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub phase: ShellPhase,
    pub systems: Vec<BusinessSystem>,
    pub tabs: Vec<Tab>,
    pub active_tab: Option<TabId>,
    pub history: Vec<Message>,
    pub pending: Option<PendingConfirmation>,
    pub voice: VoiceState,
    pub input_locked: bool,
    pub error_message: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            phase: ShellPhase::Idle,
            systems: Vec::new(),
            tabs: Vec::new(),
            active_tab: None,
            history: Vec::new(),
            pending: None,
            voice: VoiceState::Idle,
            input_locked: false,
            error_message: None,
        }
    }
}

impl UiState {
    pub fn active(&self) -> Option<&Tab> {
        let id = self.active_tab?;
        self.tabs.iter().find(|t| t.id == id)
    }
}

/// 助手阶段（UI 投影用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ShellPhase {
    Idle,
    /// 等待意图服务
    Thinking,
    AwaitingConfirmation,
    /// 操作派发中
    Executing,
    Listening,
    Transcribing,
    Speaking,
}

impl ShellPhase {
    /// 由各状态容器的当前状态推导阶段；语音优先，其次是提案与执行
    pub fn derive(voice: VoiceState, thinking: bool, awaiting: bool, executing: bool) -> Self {
        match voice {
            VoiceState::Listening => return Self::Listening,
            VoiceState::Processing => return Self::Transcribing,
            VoiceState::Speaking => return Self::Speaking,
            VoiceState::Idle => {}
        }
        if thinking {
            Self::Thinking
        } else if awaiting {
            Self::AwaitingConfirmation
        } else if executing {
            Self::Executing
        } else {
            Self::Idle
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "就绪",
            Self::Thinking => "思考中…",
            Self::AwaitingConfirmation => "等待确认",
            Self::Executing => "执行中…",
            Self::Listening => "正在聆听…",
            Self::Transcribing => "识别中…",
            Self::Speaking => "播报中…",
        }
    }
}
