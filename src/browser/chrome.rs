//! Headless Chrome 承载面
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! 每个外壳标签对应一个 Chrome 标签；headless_chrome 为阻塞 API，统一放进 spawn_blocking。
//! 操作目标若是 CSS 选择器（以 # . [ 开头或含标签名）则直接定位，否则使用按类型的默认选择器。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use headless_chrome::{Browser, Tab};

use crate::assistant::{Action, ActionKind};
use crate::browser::{ContentSurface, PageInfo, TabId};

const DEFAULT_SEARCH_SELECTOR: &str = "input[type=search], input[type=text]";
const DEFAULT_SUBMIT_SELECTOR: &str = "button[type=submit], input[type=submit]";

/// Chrome 承载面：浏览器惰性启动，标签按 TabId 复用
#[derive(Default)]
pub struct ChromeSurface {
    browser: Arc<Mutex<Option<Browser>>>,
    tabs: Arc<Mutex<HashMap<TabId, Arc<Tab>>>>,
}

impl ChromeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得（必要时创建）外壳标签对应的 Chrome 标签
    fn chrome_tab(
        browser: &Mutex<Option<Browser>>,
        tabs: &Mutex<HashMap<TabId, Arc<Tab>>>,
        id: TabId,
    ) -> Result<Arc<Tab>, String> {
        let mut tabs = tabs.lock().map_err(|e| e.to_string())?;
        if let Some(tab) = tabs.get(&id) {
            return Ok(Arc::clone(tab));
        }
        let mut guard = browser.lock().map_err(|e| e.to_string())?;
        if guard.is_none() {
            let b = Browser::default().map_err(|e| format!("Chrome launch failed: {e}"))?;
            *guard = Some(b);
        }
        let b = guard
            .as_ref()
            .ok_or_else(|| "Chrome not available".to_string())?;
        let tab = b.new_tab().map_err(|e| format!("Browser tab failed: {e}"))?;
        tabs.insert(id, Arc::clone(&tab));
        Ok(tab)
    }

    fn existing_tab(&self, id: TabId) -> Result<Arc<Tab>, String> {
        self.tabs
            .lock()
            .map_err(|e| e.to_string())?
            .get(&id)
            .cloned()
            .ok_or_else(|| format!("{id} has no loaded page"))
    }

    async fn run_js(&self, id: TabId, js: &'static str) -> Result<(), String> {
        let tab = self.existing_tab(id)?;
        tokio::task::spawn_blocking(move || {
            tab.evaluate(js, false)
                .map(|_| ())
                .map_err(|e| format!("Script failed: {e}"))
        })
        .await
        .map_err(|e| format!("Task join: {e}"))?
    }
}

fn looks_like_selector(target: &str) -> bool {
    let t = target.trim();
    t.starts_with('#')
        || t.starts_with('.')
        || t.starts_with('[')
        || t.starts_with("input")
        || t.starts_with("button")
        || t.starts_with("form")
}

fn perform(tab: &Tab, action: &Action) -> Result<(), String> {
    let selector = |fallback: &str| -> String {
        if looks_like_selector(&action.target) {
            action.target.trim().to_string()
        } else {
            fallback.to_string()
        }
    };
    match &action.kind {
        ActionKind::Search => {
            let el = tab
                .wait_for_element(&selector(DEFAULT_SEARCH_SELECTOR))
                .map_err(|e| format!("Element not found: {e}"))?;
            el.click().map_err(|e| format!("Click failed: {e}"))?;
            el.type_into(action.value.as_deref().unwrap_or_default())
                .map_err(|e| format!("Type failed: {e}"))?;
            tab.press_key("Enter")
                .map_err(|e| format!("Key press failed: {e}"))?;
        }
        ActionKind::Submit => {
            tab.wait_for_element(&selector(DEFAULT_SUBMIT_SELECTOR))
                .map_err(|e| format!("Element not found: {e}"))?
                .click()
                .map_err(|e| format!("Click failed: {e}"))?;
        }
        ActionKind::Navigate => {
            tab.navigate_to(&action.target)
                .map_err(|e| format!("Navigate failed: {e}"))?;
        }
        ActionKind::Delete | ActionKind::Other(_) => {
            if !looks_like_selector(&action.target) {
                return Err(format!("无法定位页面元素: {}", action.target));
            }
            let el = tab
                .wait_for_element(action.target.trim())
                .map_err(|e| format!("Element not found: {e}"))?;
            if let Some(value) = &action.value {
                el.type_into(value).map_err(|e| format!("Type failed: {e}"))?;
            } else {
                el.click().map_err(|e| format!("Click failed: {e}"))?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ContentSurface for ChromeSurface {
    async fn load(&self, tab: TabId, url: &str) -> Result<PageInfo, String> {
        let browser = Arc::clone(&self.browser);
        let tabs = Arc::clone(&self.tabs);
        let url = url.to_string();
        tracing::info!(%tab, url = %url, "chrome surface load");

        tokio::task::spawn_blocking(move || {
            let chrome = Self::chrome_tab(&browser, &tabs, tab)?;
            chrome
                .navigate_to(&url)
                .map_err(|e| format!("Navigate failed: {e}"))?
                .wait_until_navigated()
                .map_err(|e| format!("Page load failed: {e}"))?;
            let title = chrome.get_title().ok().filter(|t| !t.trim().is_empty());
            Ok(PageInfo { title })
        })
        .await
        .map_err(|e| format!("Task join: {e}"))?
    }

    async fn dispatch_action(&self, tab: TabId, action: &Action) -> Result<(), String> {
        let chrome = self.existing_tab(tab)?;
        let action = action.clone();
        tokio::task::spawn_blocking(move || perform(&chrome, &action))
            .await
            .map_err(|e| format!("Task join: {e}"))?
    }

    async fn back(&self, tab: TabId) -> Result<(), String> {
        self.run_js(tab, "history.back()").await
    }

    async fn forward(&self, tab: TabId) -> Result<(), String> {
        self.run_js(tab, "history.forward()").await
    }

    async fn close(&self, tab: TabId) {
        let removed = self.tabs.lock().ok().and_then(|mut t| t.remove(&tab));
        if let Some(chrome) = removed {
            let _ = tokio::task::spawn_blocking(move || chrome.close(true)).await;
        }
    }

    fn name(&self) -> &str {
        "chrome"
    }
}
