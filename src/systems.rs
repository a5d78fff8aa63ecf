//! 业务系统目录：侧边栏列出的 RIS / PIS / EIS 等系统入口
//!
//! 目录来源是 `SystemRegistry`；读取失败或没有启用的系统时回退到内置列表。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::ShellError;

/// 一个可在标签中打开的业务系统
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessSystem {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl BusinessSystem {
    pub fn new(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            icon: None,
            enabled: true,
        }
    }

    /// 侧边栏显示用图标，未配置时用默认图标
    pub fn icon_or_default(&self) -> &str {
        self.icon.as_deref().unwrap_or("📋")
    }
}

/// 业务系统目录
pub trait SystemRegistry: Send + Sync {
    /// 只返回启用的系统，保持目录中的顺序
    fn list_enabled(&self) -> Result<Vec<BusinessSystem>, ShellError>;
}

/// 内置目录
pub fn builtin_systems() -> Vec<BusinessSystem> {
    vec![
        BusinessSystem::new("ris", "RIS - 放射信息系统", "http://localhost:3000/ris"),
        BusinessSystem::new("pis", "PIS - 病理信息系统", "http://localhost:3000/pis"),
        BusinessSystem::new("eis", "EIS - 检验信息系统", "http://localhost:3000/eis"),
    ]
}

/// 内置目录的 Registry 形式
#[derive(Debug, Default)]
pub struct BuiltinRegistry;

impl SystemRegistry for BuiltinRegistry {
    fn list_enabled(&self) -> Result<Vec<BusinessSystem>, ShellError> {
        Ok(builtin_systems())
    }
}

/// 从 JSON 文件读取目录：`[{"id": "ris", "name": "...", "url": "...", "enabled": true}]`
#[derive(Debug, Clone)]
pub struct JsonSystemRegistry {
    path: PathBuf,
}

impl JsonSystemRegistry {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SystemRegistry for JsonSystemRegistry {
    fn list_enabled(&self) -> Result<Vec<BusinessSystem>, ShellError> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            ShellError::NotFound(format!("system registry {}: {e}", self.path.display()))
        })?;
        let systems: Vec<BusinessSystem> = serde_json::from_str(&data)
            .map_err(|e| ShellError::Config(format!("system registry: {e}")))?;
        Ok(systems.into_iter().filter(|s| s.enabled).collect())
    }
}

/// 读取目录；出错或为空时回退到内置列表
pub fn load_systems(registry: &dyn SystemRegistry) -> Vec<BusinessSystem> {
    match registry.list_enabled() {
        Ok(systems) if !systems.is_empty() => systems,
        Ok(_) => {
            tracing::warn!("system registry has no enabled systems; using built-in list");
            builtin_systems()
        }
        Err(e) => {
            tracing::warn!(error = %e, "system registry unavailable; using built-in list");
            builtin_systems()
        }
    }
}
