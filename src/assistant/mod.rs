//! 助手层：操作模型、风险分级、会话记录、意图服务（规则 / FastGPT）与操作中介

pub mod action;
pub mod classifier;
pub mod conversation;
pub mod fastgpt;
pub mod mediator;
pub mod mock;
pub mod persistence;
pub mod risk;
pub mod rules;

pub use action::{Action, ActionKind, RiskTier};
pub use classifier::{IntentClassifier, Proposal};
pub use conversation::{ConversationLog, Message, MessageStatus, Role};
pub use fastgpt::FastGptClassifier;
pub use mediator::{ActionMediator, ExecutionRecord, PendingConfirmation, TurnOutcome, TurnTicket};
pub use mock::ScriptedClassifier;
pub use persistence::ConversationPersistence;
pub use risk::RiskClassifier;
pub use rules::RuleClassifier;
