//! 内容承载面：真正渲染业务页面的外部协作者
//!
//! 核心只依赖 ContentSurface 契约：按标签加载 URL、向页面派发操作、前进后退（交给承载面自身的历史）。
//! 终端外壳默认使用 HttpSurface：以 HTTP 请求探测页面可达性并提取标题；
//! 需要真实页面操作时启用 `browser` 特性，使用 Headless Chrome 承载面。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::assistant::Action;
use crate::browser::TabId;

/// 页面加载成功后的信息
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub title: Option<String>,
}

/// 内容承载面契约；错误以面向用户的原因字符串返回
#[async_trait]
pub trait ContentSurface: Send + Sync {
    async fn load(&self, tab: TabId, url: &str) -> Result<PageInfo, String>;

    async fn dispatch_action(&self, tab: TabId, action: &Action) -> Result<(), String>;

    async fn back(&self, _tab: TabId) -> Result<(), String> {
        Err("history navigation is not supported by this surface".to_string())
    }

    async fn forward(&self, _tab: TabId) -> Result<(), String> {
        Err("history navigation is not supported by this surface".to_string())
    }

    /// 标签关闭时释放承载面上的对应资源
    async fn close(&self, _tab: TabId) {}

    fn name(&self) -> &str {
        "surface"
    }
}

/// 基于 HTTP 探测的承载面：GET 页面判断可达性，解析 `<title>`；不支持页面内操作
pub struct HttpSurface {
    http: reqwest::Client,
}

impl HttpSurface {
    pub fn new(timeout_secs: u64) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ContentSurface for HttpSurface {
    async fn load(&self, tab: TabId, url: &str) -> Result<PageInfo, String> {
        tracing::info!(%tab, url = %url, "http surface load");
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                "加载超时".to_string()
            } else if e.is_builder() {
                format!("无效地址: {url}")
            } else {
                format!("无法连接: {e}")
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let body = response.text().await.unwrap_or_default();
        Ok(PageInfo {
            title: extract_title(&body),
        })
    }

    async fn dispatch_action(&self, tab: TabId, action: &Action) -> Result<(), String> {
        tracing::warn!(%tab, kind = %action.kind, "page action needs an embedded browser");
        Err("当前承载面不支持页面内操作（需启用 browser 特性）".to_string())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// 提取 HTML `<title>` 文本
pub fn extract_title(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));
    re.captures(html)
        .map(|c| c[1].split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}
