//! 导航控制器：URL 规范化、按标签的加载/错误状态投影、向承载面发起加载
//!
//! 不维护前进/后退历史（交给承载面自身）；只负责「当前 URL + 加载状态」。
//! 各标签的加载相互独立：每次加载带有该标签自己的序号，完成回调只影响对应标签，
//! 同一标签上被新导航覆盖的旧加载结果会被丢弃。

use std::sync::Arc;

use url::Url;

use crate::browser::{ContentSurface, LoadState, PageInfo, TabId, TabStore};
use crate::core::ShellError;

/// 一次待发起的加载
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub tab_id: TabId,
    pub url: String,
    pub seq: u64,
}

/// 加载完成回调
#[derive(Clone, Debug)]
pub struct LoadOutcome {
    pub tab_id: TabId,
    pub seq: u64,
    pub result: Result<PageInfo, String>,
}

/// 尽力而为的 URL 规范化：不是绝对 URL 时加 `https://` 前缀重试；
/// 重试仍无法解析时原样透传前缀后的字符串，由承载面报告最终的加载失败。
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_absolute(trimmed) {
        return trimmed.to_string();
    }
    let prefixed = format!("https://{trimmed}");
    if Url::parse(&prefixed).is_err() {
        tracing::debug!(raw = %trimmed, "url still malformed after https retry; passing through");
    }
    prefixed
}

/// `localhost:8080` 之类会被解析成「scheme = localhost」，因此要求有主机名或为少数无主机 scheme
fn is_absolute(s: &str) -> bool {
    match Url::parse(s) {
        Ok(u) => u.has_host() || matches!(u.scheme(), "about" | "data" | "file"),
        Err(_) => false,
    }
}

/// 导航控制器：持有承载面句柄，可廉价克隆后移入异步任务
#[derive(Clone)]
pub struct NavigationController {
    surface: Arc<dyn ContentSurface>,
}

impl NavigationController {
    pub fn new(surface: Arc<dyn ContentSurface>) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &Arc<dyn ContentSurface> {
        &self.surface
    }

    /// 将标签导航到 raw：置为 Loading、写入规范化后的 URL，返回待发起的加载请求。
    /// 空地址只让该标签进入 Failed，并返回 Validation（不是全局错误）。
    pub fn navigate(
        &self,
        tabs: &mut TabStore,
        tab_id: TabId,
        raw: &str,
    ) -> Result<LoadRequest, ShellError> {
        if tabs.get(tab_id).is_none() {
            return Err(ShellError::NotFound(format!("tab {tab_id}")));
        }
        let url = normalize(raw);
        if url.is_empty() {
            tabs.fail_load(tab_id, "empty url")?;
            return Err(ShellError::Validation("empty url".to_string()));
        }
        let seq = tabs.begin_load(tab_id, url.clone())?;
        tracing::info!(tab = %tab_id, url = %url, seq, "navigate");
        Ok(LoadRequest { tab_id, url, seq })
    }

    /// 以当前 URL 重新加载，不改变 URL
    pub fn refresh(&self, tabs: &mut TabStore, tab_id: TabId) -> Result<LoadRequest, ShellError> {
        let url = tabs
            .get(tab_id)
            .map(|t| t.url.clone())
            .ok_or_else(|| ShellError::NotFound(format!("tab {tab_id}")))?;
        if url.trim().is_empty() {
            tabs.fail_load(tab_id, "empty url")?;
            return Err(ShellError::Validation("empty url".to_string()));
        }
        let seq = tabs.begin_load(tab_id, url.clone())?;
        tracing::info!(tab = %tab_id, url = %url, seq, "refresh");
        Ok(LoadRequest { tab_id, url, seq })
    }

    /// 新建标签并立即导航（侧栏选择业务系统时使用）
    pub fn open_in_new_tab(&self, tabs: &mut TabStore, raw: &str) -> Result<LoadRequest, ShellError> {
        let tab = tabs.create_tab(normalize(raw));
        self.navigate(tabs, tab.id, raw)
    }

    /// 向承载面发起加载并等待结果（不触碰标签状态，可在独立任务中运行）
    pub async fn load(&self, request: LoadRequest) -> LoadOutcome {
        let result = self.surface.load(request.tab_id, &request.url).await;
        if let Err(reason) = &result {
            tracing::warn!(tab = %request.tab_id, url = %request.url, reason = %reason, "load failed");
        }
        LoadOutcome {
            tab_id: request.tab_id,
            seq: request.seq,
            result,
        }
    }

    /// 应用加载结果；标签已关闭或结果过期时返回 false
    pub fn complete(&self, tabs: &mut TabStore, outcome: LoadOutcome) -> bool {
        let (state, title) = match outcome.result {
            Ok(info) => (LoadState::Loaded, info.title),
            Err(reason) => (LoadState::Failed(reason), None),
        };
        match tabs.finish_load(outcome.tab_id, outcome.seq, state) {
            Ok(true) => {
                if let Some(title) = title {
                    let _ = tabs.set_title(outcome.tab_id, title);
                }
                true
            }
            Ok(false) => false,
            Err(_) => {
                tracing::debug!(tab = %outcome.tab_id, "load finished for closed tab");
                false
            }
        }
    }

    /// 导航并等待加载完成，返回最终加载状态
    pub async fn navigate_and_wait(
        &self,
        tabs: &mut TabStore,
        tab_id: TabId,
        raw: &str,
    ) -> Result<LoadState, ShellError> {
        let request = self.navigate(tabs, tab_id, raw)?;
        let outcome = self.load(request).await;
        self.complete(tabs, outcome);
        tabs.get(tab_id)
            .map(|t| t.load_state.clone())
            .ok_or_else(|| ShellError::NotFound(format!("tab {tab_id}")))
    }

    pub async fn back(&self, tab_id: TabId) -> Result<(), ShellError> {
        self.surface
            .back(tab_id)
            .await
            .map_err(|e| ShellError::transient(self.surface.name(), e))
    }

    pub async fn forward(&self, tab_id: TabId) -> Result<(), ShellError> {
        self.surface
            .forward(tab_id)
            .await
            .map_err(|e| ShellError::transient(self.surface.name(), e))
    }
}
