//! 会话监管：生命周期、中断管理
//!
//! 持有根 CancellationToken；每轮提案请求领取一个子 token，助手会话被重置或外壳退出时取消，
//! 迟到的结果由操作中介按票据丢弃。

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理：根取消令牌与当前轮的子令牌
#[derive(Debug)]
pub struct SessionSupervisor {
    /// 外壳退出时触发
    cancel_token: CancellationToken,
    /// 当前进行中的提案请求
    turn_token: Option<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            turn_token: None,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 为新一轮领取子 token（替换上一轮的 token）
    pub fn begin_turn(&mut self) -> CancellationToken {
        let token = self.cancel_token.child_token();
        self.turn_token = Some(token.clone());
        token
    }

    /// 本轮结束（结果已到达）
    pub fn end_turn(&mut self) {
        self.turn_token = None;
    }

    /// 取消当前轮；返回是否确有进行中的轮次
    pub fn cancel_turn(&mut self) -> bool {
        match self.turn_token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 外壳退出：取消根 token（连带所有子 token）
    pub fn shutdown(&mut self) {
        self.turn_token = None;
        self.cancel_token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_turn_only_affects_current_turn() {
        let mut supervisor = SessionSupervisor::new();
        let first = supervisor.begin_turn();
        supervisor.end_turn();
        let second = supervisor.begin_turn();

        assert!(supervisor.cancel_turn());
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
        assert!(!supervisor.cancel_turn());
        assert!(!supervisor.is_shut_down());
    }

    #[test]
    fn test_shutdown_cancels_children() {
        let mut supervisor = SessionSupervisor::new();
        let turn = supervisor.begin_turn();
        supervisor.shutdown();
        assert!(turn.is_cancelled());
        assert!(supervisor.is_shut_down());
    }
}
