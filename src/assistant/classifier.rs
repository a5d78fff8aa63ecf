//! 意图服务抽象
//!
//! 所有后端（规则匹配 / FastGPT）实现 IntentClassifier：根据历史与本轮输入给出一个提案
//! （回复文本 + 有序操作列表）。核心不关心语言理解的内部实现。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assistant::{Action, Message};
use crate::core::ShellError;

/// 一轮助手回复：文本与零个或多个有序操作
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub content: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Proposal {
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// 意图服务：可能因网络或服务故障返回 TransientService
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn propose(&self, history: &[Message], utterance: &str) -> Result<Proposal, ShellError>;

    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "classifier"
    }
}
