//! 会话记录：用户与助手的消息序列
//!
//! 只追加；顺序即因果/创建顺序。已追加的消息不可变，唯一例外是一轮对话末尾的助手消息，
//! 它通过 `status` 从 Pending 迁移到最终状态（并可追加执行结果行）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assistant::Action;
use crate::core::ShellError;

/// 消息角色
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

/// 助手消息的显示状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    /// 正在等待意图服务
    Pending,
    /// 含高风险操作，等待用户确认
    AwaitingConfirmation,
    /// 操作已派发，等待执行结果
    Executing,
    Final,
    Failed(String),
    /// 会话被重置，迟到的结果已丢弃
    Discarded,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub proposed_actions: Vec<Action>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            proposed_actions: Vec::new(),
            status: MessageStatus::Final,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            proposed_actions: Vec::new(),
            status: MessageStatus::Final,
            created_at: Utc::now(),
        }
    }

    /// 占位助手消息（打字指示），待提案返回后补全
    pub fn pending() -> Self {
        Self {
            status: MessageStatus::Pending,
            ..Self::assistant("")
        }
    }

    pub fn is_terminal_pending(&self) -> bool {
        matches!(
            self.status,
            MessageStatus::Pending | MessageStatus::AwaitingConfirmation | MessageStatus::Executing
        )
    }
}

/// 会话记录；保留最近 max_messages 条，超出时从最旧处剪枝（不会剪掉仍在等待的消息）
#[derive(Clone, Debug)]
pub struct ConversationLog {
    messages: Vec<Message>,
    max_messages: usize,
}

impl ConversationLog {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: max_messages.max(2),
        }
    }

    /// 以已有消息（如从磁盘恢复）初始化
    pub fn with_messages(max_messages: usize, messages: Vec<Message>) -> Self {
        let mut log = Self::new(max_messages);
        log.messages = messages;
        log.prune();
        log
    }

    pub fn push(&mut self, msg: Message) -> Uuid {
        let id = msg.id;
        self.messages.push(msg);
        self.prune();
        id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// 修改处于等待状态的助手消息；其它消息不可变
    pub fn update_pending<F>(&mut self, id: Uuid, f: F) -> Result<(), ShellError>
    where
        F: FnOnce(&mut Message),
    {
        let msg = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ShellError::NotFound(format!("message {id}")))?;
        if msg.role != Role::Assistant || !msg.is_terminal_pending() {
            return Err(ShellError::InvalidTransition {
                state: format!("{:?}", msg.status),
                event: "update message".to_string(),
            });
        }
        f(msg);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn prune(&mut self) {
        while self.messages.len() > self.max_messages {
            match self.messages.first() {
                Some(m) if !m.is_terminal_pending() => {
                    self.messages.remove(0);
                }
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_order() {
        let mut log = ConversationLog::new(10);
        log.push(Message::user("a"));
        log.push(Message::assistant("b"));
        let contents: Vec<_> = log.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
    }

    #[test]
    fn test_final_messages_are_immutable() {
        let mut log = ConversationLog::new(10);
        let user = log.push(Message::user("hi"));
        let reply = log.push(Message::assistant("hello"));
        assert!(log.update_pending(user, |m| m.content.clear()).is_err());
        assert!(log.update_pending(reply, |m| m.content.clear()).is_err());

        let pending = log.push(Message::pending());
        log.update_pending(pending, |m| {
            m.content = "done".into();
            m.status = MessageStatus::Final;
        })
        .unwrap();
        assert_eq!(log.get(pending).unwrap().content, "done");
        assert!(log.update_pending(pending, |_| {}).is_err());
    }

    #[test]
    fn test_prune_keeps_recent() {
        let mut log = ConversationLog::new(4);
        for i in 0..6 {
            log.push(Message::user(format!("m{i}")));
        }
        assert_eq!(log.len(), 4);
        assert_eq!(log.messages()[0].content, "m2");
    }
}
