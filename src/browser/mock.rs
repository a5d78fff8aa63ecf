//! Mock 承载面（用于测试，无需浏览器）
//!
//! 记录每次 load / dispatch_action 调用；可配置失败的 URL、失败的操作类型，以及按 URL 的加载延迟与按类型的操作延迟。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::assistant::{Action, ActionKind};
use crate::browser::{ContentSurface, PageInfo, TabId};

/// 一次承载面调用
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceCall {
    Load { tab: TabId, url: String },
    Dispatch { tab: TabId, action: Action },
    Close { tab: TabId },
}

/// 记录调用的承载面
#[derive(Debug, Default)]
pub struct MockSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    failing_urls: HashSet<String>,
    failing_kinds: HashSet<String>,
    delays: HashMap<String, Duration>,
    dispatch_delays: HashMap<String, Duration>,
}

impl MockSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_url(mut self, url: impl Into<String>) -> Self {
        self.failing_urls.insert(url.into());
        self
    }

    pub fn fail_kind(mut self, kind: ActionKind) -> Self {
        self.failing_kinds.insert(kind.name().to_string());
        self
    }

    pub fn delay_url(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }

    pub fn delay_kind(mut self, kind: ActionKind, delay: Duration) -> Self {
        self.dispatch_delays.insert(kind.name().to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 所有派发过的操作（按调用顺序）
    pub fn dispatched(&self) -> Vec<Action> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Dispatch { action, .. } => Some(action),
                _ => None,
            })
            .collect()
    }

    /// 所有加载过的 URL（按调用顺序）
    pub fn loaded(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Load { url, .. } => Some(url),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SurfaceCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ContentSurface for MockSurface {
    async fn load(&self, tab: TabId, url: &str) -> Result<PageInfo, String> {
        self.record(SurfaceCall::Load {
            tab,
            url: url.to_string(),
        });
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_urls.contains(url) {
            return Err(format!("unreachable: {url}"));
        }
        Ok(PageInfo {
            title: Some(format!("Mock {url}")),
        })
    }

    async fn dispatch_action(&self, tab: TabId, action: &Action) -> Result<(), String> {
        self.record(SurfaceCall::Dispatch {
            tab,
            action: action.clone(),
        });
        if let Some(delay) = self.dispatch_delays.get(action.kind.name()) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_kinds.contains(action.kind.name()) {
            return Err(format!("{} failed", action.kind));
        }
        Ok(())
    }

    async fn close(&self, tab: TabId) {
        self.record(SurfaceCall::Close { tab });
    }

    fn name(&self) -> &str {
        "mock"
    }
}
