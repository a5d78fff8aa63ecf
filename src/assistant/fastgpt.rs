//! FastGPT 意图服务
//!
//! POST `{endpoint}/api/v1/chat/completion`，Bearer 认证；请求体为本轮问题 + 历史。
//! 回复中的 `[action:类型:目标]` 或 `[action:类型:目标|值]` 标记被解析为有序操作，并从展示文本中移除。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::assistant::{Action, ActionKind, IntentClassifier, Message, Proposal, Role};
use crate::core::ShellError;

const SERVICE: &str = "intent service";

#[derive(Debug, Serialize)]
struct FastGptMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct FastGptRequest<'a> {
    query: &'a str,
    history: Vec<FastGptMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct FastGptResponse {
    data: Option<FastGptData>,
}

#[derive(Debug, Deserialize)]
struct FastGptData {
    content: String,
}

/// FastGPT HTTP 客户端
pub struct FastGptClassifier {
    endpoint: String,
    api_key: String,
    http: reqwest::Client,
}

impl FastGptClassifier {
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> Result<Self, ShellError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| ShellError::Config(format!("http client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }
}

#[async_trait]
impl IntentClassifier for FastGptClassifier {
    async fn propose(&self, history: &[Message], utterance: &str) -> Result<Proposal, ShellError> {
        let url = format!("{}/api/v1/chat/completion", self.endpoint);
        let body = FastGptRequest {
            query: utterance,
            history: history
                .iter()
                .filter(|m| !m.content.is_empty())
                .map(|m| FastGptMessage {
                    role: match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: &m.content,
                })
                .collect(),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "FastGPT request failed");
                ShellError::transient(SERVICE, if e.is_timeout() { "timeout".to_string() } else { e.to_string() })
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %text, "FastGPT API error");
            return Err(ShellError::transient(SERVICE, format!("HTTP {status}")));
        }

        let parsed: FastGptResponse = response
            .json()
            .await
            .map_err(|e| ShellError::transient(SERVICE, format!("invalid response: {e}")))?;
        let raw = parsed.data.map(|d| d.content).unwrap_or_default();
        let proposal = parse_proposal(&raw);
        tracing::info!(actions = proposal.actions.len(), "FastGPT proposal received");
        Ok(proposal)
    }

    fn name(&self) -> &str {
        "fastgpt"
    }
}

fn action_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[action:([^:\]]+):([^\]|]*)(?:\|([^\]]*))?\]").expect("valid action regex")
    })
}

/// 从回复文本中提取操作标记，返回去除标记后的文本与操作列表
pub fn parse_proposal(raw: &str) -> Proposal {
    let re = action_marker();
    let actions = re
        .captures_iter(raw)
        .map(|c| {
            let kind = ActionKind::from_name(&c[1]);
            let target = c.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            let mut action = Action::new(kind, target);
            action.value = c
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty());
            action
        })
        .collect();
    let content = re.replace_all(raw, "").trim().to_string();
    Proposal { content, actions }
}
