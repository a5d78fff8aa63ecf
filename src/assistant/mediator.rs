//! 操作中介：提案 → 风险分级 →（自动执行 | 确认后执行）
//!
//! 纯状态容器，不直接调用任何外部服务：
//! - `begin_turn` 追加用户消息与占位回复，返回本轮票据；同一时刻只允许一个进行中的提案
//! - `complete_turn` 接收意图服务结果，决定立即执行哪些操作或创建唯一的待确认操作
//! - `confirm` / `cancel` 处理用户决定，`finish_execution` 记录执行结果
//!
//! 每轮在开始时绑定当时的活动标签，提案中的操作只落到这个标签上。
//! 提案进行中、待确认、或上一批操作仍在执行时收到新输入：直接拒绝（ResourceConflict）。

use serde::Serialize;
use uuid::Uuid;

use crate::assistant::{
    Action, ConversationLog, Message, MessageStatus, Proposal, RiskClassifier, RiskTier,
};
use crate::browser::TabId;
use crate::core::ShellError;

/// 进行中的一轮提案请求
#[derive(Clone, Debug)]
pub struct TurnTicket {
    pub id: u64,
    /// 占位助手消息 id
    pub reply_id: Uuid,
    pub utterance: String,
    /// 发送时的活动标签；None 表示当时没有打开的页面
    pub tab: Option<TabId>,
    /// 发送时的历史快照（不含本轮输入与占位回复）
    pub history: Vec<Message>,
}

/// 唯一的待确认高风险操作
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingConfirmation {
    pub action: Action,
    /// 提出该操作的助手消息
    pub message_id: Uuid,
    /// 操作所针对的标签（提出时的活动标签）
    pub tab: Option<TabId>,
}

/// 提案处理结果
#[derive(Debug, PartialEq)]
pub enum TurnOutcome {
    /// 全部为低风险（含空集合）：按提案顺序执行
    Execute {
        message_id: Uuid,
        tab: Option<TabId>,
        actions: Vec<Action>,
    },
    /// 存在高风险操作：等待确认，本轮不执行任何操作
    AwaitingConfirmation(PendingConfirmation),
    /// 意图服务失败，已写入失败回复
    Failed { message_id: Uuid, error: ShellError },
    /// 票据已过期（会话被重置或中止），结果被丢弃
    Discarded,
}

/// 单个操作的执行结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub action: Action,
    pub result: Result<(), String>,
}

#[derive(Debug)]
struct InFlight {
    ticket_id: u64,
    reply_id: Uuid,
    tab: Option<TabId>,
}

/// 操作中介状态
#[derive(Debug)]
pub struct ActionMediator {
    log: ConversationLog,
    risk: RiskClassifier,
    pending: Option<PendingConfirmation>,
    in_flight: Option<InFlight>,
    /// 正在执行的那条助手消息
    executing: Option<Uuid>,
    next_ticket: u64,
}

impl ActionMediator {
    pub fn new(log: ConversationLog, risk: RiskClassifier) -> Self {
        Self {
            log,
            risk,
            pending: None,
            in_flight: None,
            executing: None,
            next_ticket: 0,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn pending(&self) -> Option<&PendingConfirmation> {
        self.pending.as_ref()
    }

    /// 是否有进行中的提案（UI 显示「正在输入」并锁定输入）
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight_ticket(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|f| f.ticket_id)
    }

    /// 是否有一批操作尚未回报执行结果
    pub fn is_executing(&self) -> bool {
        self.executing.is_some()
    }

    /// 追加一条助手消息（如问候语、语音识别失败提示）
    pub fn say(&mut self, content: impl Into<String>) -> Uuid {
        self.log.push(Message::assistant(content))
    }

    /// 开始一轮：校验并追加用户消息，返回提案请求票据；`tab` 为此刻的活动标签
    pub fn begin_turn(
        &mut self,
        utterance: &str,
        tab: Option<TabId>,
    ) -> Result<TurnTicket, ShellError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(ShellError::Validation("empty message".to_string()));
        }
        if self.in_flight.is_some() {
            return Err(ShellError::ResourceConflict(
                "a proposal is already in flight".to_string(),
            ));
        }
        if let Some(p) = &self.pending {
            return Err(ShellError::ResourceConflict(format!(
                "awaiting confirmation for: {}",
                p.action.describe()
            )));
        }
        if self.executing.is_some() {
            return Err(ShellError::ResourceConflict(
                "previous actions are still executing".to_string(),
            ));
        }

        let history = self.log.messages().to_vec();
        self.log.push(Message::user(utterance));
        let reply_id = self.log.push(Message::pending());

        self.next_ticket += 1;
        let ticket_id = self.next_ticket;
        self.in_flight = Some(InFlight {
            ticket_id,
            reply_id,
            tab,
        });
        tracing::debug!(ticket = ticket_id, tab = ?tab, "turn started");

        Ok(TurnTicket {
            id: ticket_id,
            reply_id,
            utterance: utterance.to_string(),
            tab,
            history,
        })
    }

    /// 接收意图服务结果并决定执行方式
    pub fn complete_turn(
        &mut self,
        ticket_id: u64,
        result: Result<Proposal, ShellError>,
    ) -> TurnOutcome {
        let (reply_id, tab) = match &self.in_flight {
            Some(f) if f.ticket_id == ticket_id => (f.reply_id, f.tab),
            _ => {
                tracing::debug!(ticket = ticket_id, "stale proposal discarded");
                return TurnOutcome::Discarded;
            }
        };
        self.in_flight = None;

        let proposal = match result {
            Ok(p) => p,
            Err(error) => {
                tracing::warn!(error = %error, "proposal failed");
                let fallback = format!("抱歉，助手暂时无法响应（{error}），请稍后重试。");
                let status = MessageStatus::Failed(error.to_string());
                self.update(reply_id, |m| {
                    m.content = fallback;
                    m.status = status;
                });
                return TurnOutcome::Failed {
                    message_id: reply_id,
                    error,
                };
            }
        };

        let actions: Vec<Action> = proposal
            .actions
            .into_iter()
            .map(|a| self.risk.tag(a))
            .collect();
        let first_high = actions
            .iter()
            .find(|a| a.risk_tier == RiskTier::High)
            .cloned();

        match first_high {
            Some(action) => {
                let note = format!("⚠ 该操作需要您确认：{}", action.describe());
                self.update(reply_id, |m| {
                    m.content = join_lines(&proposal.content, &note);
                    m.proposed_actions = actions;
                    m.status = MessageStatus::AwaitingConfirmation;
                });
                let pending = PendingConfirmation {
                    action,
                    message_id: reply_id,
                    tab,
                };
                self.pending = Some(pending.clone());
                TurnOutcome::AwaitingConfirmation(pending)
            }
            None => {
                let status = if actions.is_empty() {
                    MessageStatus::Final
                } else {
                    MessageStatus::Executing
                };
                let planned = actions.clone();
                self.update(reply_id, |m| {
                    m.content = proposal.content;
                    m.proposed_actions = planned;
                    m.status = status;
                });
                if !actions.is_empty() {
                    self.executing = Some(reply_id);
                }
                TurnOutcome::Execute {
                    message_id: reply_id,
                    tab,
                    actions,
                }
            }
        }
    }

    /// 确认待执行操作：返回需执行的那一个操作，原助手消息转入 Executing
    pub fn confirm(&mut self) -> Result<PendingConfirmation, ShellError> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| ShellError::NotFound("no pending confirmation".to_string()))?;
        self.update(pending.message_id, |m| m.status = MessageStatus::Executing);
        self.executing = Some(pending.message_id);
        Ok(pending)
    }

    /// 取消待执行操作：整批作废，追加一条取消说明，返回其 id
    pub fn cancel(&mut self) -> Result<Uuid, ShellError> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| ShellError::NotFound("no pending confirmation".to_string()))?;
        self.update(pending.message_id, |m| m.status = MessageStatus::Final);
        Ok(self.log.push(Message::assistant(format!(
            "已取消：{}。本轮提议的其他操作也不会执行。",
            pending.action.describe()
        ))))
    }

    /// 记录执行结果并把助手消息定稿
    pub fn finish_execution(
        &mut self,
        message_id: Uuid,
        records: &[ExecutionRecord],
    ) -> Result<(), ShellError> {
        if self.executing == Some(message_id) {
            self.executing = None;
        }
        let lines: Vec<String> = records
            .iter()
            .map(|r| match &r.result {
                Ok(()) => format!("✓ {}", r.action.describe()),
                Err(e) => format!("✗ {}：{}", r.action.describe(), e),
            })
            .collect();
        self.log.update_pending(message_id, |m| {
            if !lines.is_empty() {
                m.content = join_lines(&m.content, &lines.join("\n"));
            }
            m.status = MessageStatus::Final;
        })
    }

    /// 中止进行中的提案：占位回复标记为 Discarded，迟到的结果将被丢弃
    pub fn abort_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(f) => {
                self.update(f.reply_id, |m| {
                    m.content = "（已中止）".to_string();
                    m.status = MessageStatus::Discarded;
                });
                tracing::debug!(ticket = f.ticket_id, "in-flight proposal aborted");
                true
            }
            None => false,
        }
    }

    /// 标签被关闭：针对该标签的进行中提案被中止，返回是否中止了提案
    pub fn abort_for_tab(&mut self, tab: TabId) -> bool {
        let bound = self.in_flight.as_ref().is_some_and(|f| f.tab == Some(tab));
        bound && self.abort_in_flight()
    }

    /// 标签被关闭：针对该标签的待确认操作作废，原消息定稿并注明原因
    pub fn void_pending_for_tab(&mut self, tab: TabId) -> bool {
        if !self.pending.as_ref().is_some_and(|p| p.tab == Some(tab)) {
            return false;
        }
        let Some(pending) = self.pending.take() else {
            return false;
        };
        let note = format!("目标页面已关闭，未执行：{}", pending.action.describe());
        self.update(pending.message_id, |m| {
            m.content = join_lines(&m.content, &note);
            m.status = MessageStatus::Final;
        });
        tracing::info!(tab = %tab, "pending action voided by tab close");
        true
    }

    /// 重置助手会话：清空记录、待确认、进行中的提案与执行标记
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.executing = None;
        self.pending = None;
        self.log.clear();
    }

    /// 更新本中介持有的等待中消息；消息可能已被剪枝，此时只记录日志
    fn update<F: FnOnce(&mut Message)>(&mut self, id: Uuid, f: F) {
        if let Err(e) = self.log.update_pending(id, f) {
            tracing::warn!(error = %e, "assistant message update skipped");
        }
    }
}

fn join_lines(head: &str, tail: &str) -> String {
    if head.trim().is_empty() {
        tail.to_string()
    } else {
        format!("{head}\n{tail}")
    }
}
