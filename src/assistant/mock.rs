//! Mock 意图服务（用于测试，无需 FastGPT）
//!
//! 按顺序返回预先排好的提案或错误；队列为空时回一句普通回复。可配置延迟以模拟慢服务。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::assistant::{IntentClassifier, Message, Proposal};
use crate::core::ShellError;

/// 脚本化意图服务
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Result<Proposal, ShellError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, proposal: Proposal) -> Self {
        self.push(Ok(proposal));
        self
    }

    pub fn then_fail(self, reason: &str) -> Self {
        self.push(Err(ShellError::transient("intent service", reason)));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(&self, item: Result<Proposal, ShellError>) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(item);
        }
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn propose(&self, _history: &[Message], utterance: &str) -> Result<Proposal, ShellError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(Proposal::reply(format!("收到：{utterance}"))))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
