//! 助手提议的页面操作
//!
//! `risk_tier` 由风险分级器根据 `kind` 推导；外部提案携带的风险值在反序列化时直接丢弃。

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 操作类型；未识别的类型保留原名
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Search,
    Navigate,
    Submit,
    Delete,
    Other(String),
}

impl ActionKind {
    /// 从提案中的类型名解析（大小写不敏感，支持常见别名）
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "search" | "query" | "find" => Self::Search,
            "navigate" | "open" | "goto" | "browse" => Self::Navigate,
            "submit" | "save" => Self::Submit,
            "delete" | "remove" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Search => "search",
            Self::Navigate => "navigate",
            Self::Submit => "submit",
            Self::Delete => "delete",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

/// 风险等级：Low 自动执行，High 需用户确认
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    #[default]
    Low,
    High,
}

/// 针对当前页面的一个离散操作
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// 操作目标：导航时为 URL，页面操作时为元素选择器或记录描述
    pub target: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, skip_deserializing)]
    pub risk_tier: RiskTier,
}

impl Action {
    pub fn new(kind: ActionKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            value: None,
            risk_tier: RiskTier::Low,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn search(target: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(ActionKind::Search, target).with_value(query)
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(ActionKind::Navigate, url)
    }

    pub fn submit(target: impl Into<String>) -> Self {
        Self::new(ActionKind::Submit, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(ActionKind::Delete, target)
    }

    /// 面向用户的简短描述，用于确认提示与执行记录
    pub fn describe(&self) -> String {
        match (&self.kind, &self.value) {
            (ActionKind::Search, Some(q)) => format!("在 {} 中搜索「{}」", self.target, q),
            (ActionKind::Navigate, _) => format!("打开 {}", self.target),
            (ActionKind::Submit, _) => format!("提交 {}", self.target),
            (ActionKind::Delete, _) => format!("删除 {}", self.target),
            (kind, Some(v)) => format!("{} {} = {}", kind, self.target, v),
            (kind, None) => format!("{} {}", kind, self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!(ActionKind::from_name("SUBMIT"), ActionKind::Submit);
        assert_eq!(ActionKind::from_name("remove"), ActionKind::Delete);
        assert_eq!(ActionKind::from_name("open"), ActionKind::Navigate);
        assert_eq!(
            ActionKind::from_name("click"),
            ActionKind::Other("click".to_string())
        );
    }

    #[test]
    fn test_external_risk_tier_is_ignored() {
        let json = r##"{"kind": "search", "target": "#q", "value": "张三", "risk_tier": "High"}"##;
        let action: Action = serde_json::from_str(json).unwrap();
        assert_eq!(action.kind, ActionKind::Search);
        assert_eq!(action.risk_tier, RiskTier::Low);
        assert_eq!(action.value.as_deref(), Some("张三"));
    }
}
