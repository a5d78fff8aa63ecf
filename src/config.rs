//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `EW__*` 覆盖（双下划线表示嵌套，如 `EW__ASSISTANT__PROVIDER=fastgpt`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub assistant: AssistantSection,
    pub surface: SurfaceSection,
    pub risk: RiskSection,
    pub voice: VoiceSection,
    pub systems: SystemsSection,
}

/// [app] 段：应用名、对话保留条数、对话持久化路径
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// 未设置时不持久化对话
    pub history_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            max_history: default_max_history(),
            history_path: None,
        }
    }
}

fn default_app_name() -> String {
    "EW 智能助手".to_string()
}

fn default_max_history() -> usize {
    200
}

/// [assistant] 段：意图服务选择
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSection {
    /// rules（本地关键词匹配）/ fastgpt
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// 存放 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            request_timeout: default_request_timeout(),
            greeting: default_greeting(),
        }
    }
}

impl AssistantSection {
    /// 从 `api_key_env` 指定的环境变量读取 Key
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.trim().is_empty())
    }
}

fn default_provider() -> String {
    "rules".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_key_env() -> String {
    "FASTGPT_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_greeting() -> String {
    "您好！我是 EW 智能助手，可以帮您搜索、跳转页面或处理表单。".to_string()
}

/// [surface] 段：内容承载面
#[derive(Debug, Clone, Deserialize)]
pub struct SurfaceSection {
    /// http（探测加载，默认）/ chrome（需 browser 特性）
    #[serde(default = "default_surface_kind")]
    pub kind: String,
    /// 页面加载超时（秒）
    #[serde(default = "default_load_timeout")]
    pub load_timeout: u64,
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            kind: default_surface_kind(),
            load_timeout: default_load_timeout(),
        }
    }
}

fn default_surface_kind() -> String {
    "http".to_string()
}

fn default_load_timeout() -> u64 {
    15
}

/// [risk] 段：额外需要确认的操作类型（Submit / Delete 始终需要确认）
#[derive(Debug, Clone, Deserialize)]
pub struct RiskSection {
    #[serde(default = "default_extra_high_kinds")]
    pub extra_high_kinds: Vec<String>,
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            extra_high_kinds: default_extra_high_kinds(),
        }
    }
}

fn default_extra_high_kinds() -> Vec<String> {
    vec!["payment".into(), "transfer".into(), "confirm".into()]
}

/// [voice] 段：语音输入输出
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_language")]
    pub language: String,
    /// 未设置时语音识别不可用
    pub asr_endpoint: Option<String>,
    pub asr_api_key: Option<String>,
    #[serde(default)]
    pub tts_enabled: bool,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            language: default_language(),
            asr_endpoint: None,
            asr_api_key: None,
            tts_enabled: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "zh-CN".to_string()
}

/// [systems] 段：业务系统目录文件；未设置时使用内置列表
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SystemsSection {
    pub registry_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 EW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 EW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("EW")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("risk.extra_high_kinds")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
