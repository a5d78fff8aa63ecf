//! 对话持久化
//!
//! 将会话记录写入/从 JSON 文件加载，用于跨进程恢复助手对话（可选使用）。
//! 仍处于等待状态的消息不写盘：重启后它们已没有对应的进行中请求。

use std::path::{Path, PathBuf};

use crate::assistant::Message;

/// 单文件 JSON 持久化
#[derive(Debug, Clone)]
pub struct ConversationPersistence {
    path: PathBuf,
}

impl ConversationPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 从 JSON 文件加载会话记录；文件不存在时返回空 Vec
    pub fn load(&self) -> anyhow::Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        let messages: Vec<Message> = serde_json::from_str(&data)?;
        Ok(messages)
    }

    /// 写入已定稿的消息
    pub fn save(&self, messages: &[Message]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let settled: Vec<&Message> = messages.iter().filter(|m| !m.is_terminal_pending()).collect();
        std::fs::write(&self.path, serde_json::to_string_pretty(&settled)?)?;
        Ok(())
    }
}
