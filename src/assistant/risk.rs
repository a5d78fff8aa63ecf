//! 风险分级
//!
//! 固定策略：Submit / Delete 恒为 High；Search、Navigate 与未识别类型为 Low。
//! 可通过配置追加 High 类型（默认 payment、transfer、confirm），但不能降低 Submit / Delete。

use std::collections::HashSet;

use crate::assistant::{Action, ActionKind, RiskTier};

/// 纯函数式的风险分级器
#[derive(Debug, Clone, Default)]
pub struct RiskClassifier {
    extra_high: HashSet<String>,
}

impl RiskClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加视为 High 的类型名（大小写不敏感）
    pub fn with_extra_high<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extra_high
            .extend(kinds.into_iter().map(|k| k.as_ref().trim().to_lowercase()));
        self
    }

    pub fn classify(&self, kind: &ActionKind) -> RiskTier {
        match kind {
            ActionKind::Submit | ActionKind::Delete => RiskTier::High,
            ActionKind::Search | ActionKind::Navigate => RiskTier::Low,
            ActionKind::Other(name) if self.extra_high.contains(name.as_str()) => RiskTier::High,
            ActionKind::Other(_) => RiskTier::Low,
        }
    }

    /// 按 kind 重新计算并覆盖动作的风险等级
    pub fn tag(&self, mut action: Action) -> Action {
        action.risk_tier = self.classify(&action.kind);
        action
    }
}
