//! 规则意图服务（不调用网络）
//!
//! 用关键词快速匹配把一句话拆成有序操作：搜索 / 打开 / 提交 / 删除；
//! 「然后」「；」等连接词把一句话拆成多个步骤。无匹配时给出普通回复。
//! 未配置 FastGPT 时作为默认后端，也用于测试。

use async_trait::async_trait;

use crate::assistant::{Action, IntentClassifier, Message, Proposal};
use crate::core::ShellError;

/// 多步骤分隔词
const STEP_SEPARATORS: &[&str] = &["然后", "；", ";", "，再", " then "];

const SEARCH_PREFIXES: &[&str] = &["搜索", "查询", "查一下", "帮我查", "search"];
const NAVIGATE_PREFIXES: &[&str] = &["打开", "访问", "进入", "open", "goto", "browse"];
const SUBMIT_PREFIXES: &[&str] = &["提交", "保存", "submit", "save"];
const DELETE_PREFIXES: &[&str] = &["删除", "移除", "delete", "remove"];

/// 关键词规则意图服务
#[derive(Debug, Default, Clone)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 对单个步骤做快速匹配
    fn fast_match(step: &str) -> Option<Action> {
        let step = step.trim();
        if step.is_empty() {
            return None;
        }
        let lower = step.to_lowercase();

        if let Some(rest) = strip_any(step, &lower, DELETE_PREFIXES) {
            return Some(Action::delete(or_default(rest, "当前记录")));
        }
        if let Some(rest) = strip_any(step, &lower, SUBMIT_PREFIXES) {
            return Some(Action::submit(or_default(rest, "当前表单")));
        }
        if let Some(rest) = strip_any(step, &lower, SEARCH_PREFIXES) {
            let query = rest.trim();
            if query.is_empty() {
                return None;
            }
            return Some(Action::search("当前页面", query));
        }
        if let Some(url) = extract_url(step) {
            return Some(Action::navigate(url));
        }
        if let Some(rest) = strip_any(step, &lower, NAVIGATE_PREFIXES) {
            let target = rest.trim();
            if !target.is_empty() {
                return Some(Action::navigate(target));
            }
        }
        None
    }
}

#[async_trait]
impl IntentClassifier for RuleClassifier {
    async fn propose(&self, _history: &[Message], utterance: &str) -> Result<Proposal, ShellError> {
        let actions: Vec<Action> = split_steps(utterance)
            .into_iter()
            .filter_map(Self::fast_match)
            .collect();

        let content = if actions.is_empty() {
            "好的，我理解了您的问题。如需操作业务系统，请告诉我要搜索、打开、提交或删除的内容。"
                .to_string()
        } else {
            let steps: Vec<String> = actions.iter().map(|a| a.describe()).collect();
            format!("好的，将为您执行：{}", steps.join("；"))
        };

        Ok(Proposal { content, actions })
    }

    fn name(&self) -> &str {
        "rules"
    }
}

fn split_steps(input: &str) -> Vec<&str> {
    let mut steps = vec![input];
    for sep in STEP_SEPARATORS {
        steps = steps.into_iter().flat_map(|s| s.split(sep)).collect();
    }
    steps
}

/// 匹配前缀（大小写不敏感），返回原文中前缀之后的部分
fn strip_any<'a>(original: &'a str, lower: &str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|p| {
        if lower.starts_with(p) {
            // 前缀均为 ASCII 或与原文逐字节相同的中文，长度一致
            original.get(p.len()..)
        } else {
            None
        }
    })
}

fn or_default(rest: &str, default: &str) -> String {
    let rest = rest.trim();
    if rest.is_empty() {
        default.to_string()
    } else {
        rest.to_string()
    }
}

/// 从文本中提取 URL
fn extract_url(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|w| w.starts_with("http://") || w.starts_with("https://"))
        .map(|w| w.to_string())
}
