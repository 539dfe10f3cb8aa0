//! Affinity Core 配置模块
//!
//! 该模块提供了应用程序配置管理功能，包括：
//! - 配置文件加载和解析（单文件或目录合并）
//! - 环境特定配置覆盖
//! - 后端连接、日志、重试和各服务配置定义

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use toml::Value;
use tracing::warn;

mod manager;
pub use manager::ConfigManager;

/// 全局应用配置实例，使用 OnceLock 确保只初始化一次
static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// 后端（认证 / 文档库 / 对象存储）连接配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendProfileConfig {
    /// 后端类型（memory 为进程内实现）
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    /// 项目标识
    #[serde(default)]
    pub project_id: Option<String>,
    /// 服务端点
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API 密钥
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_backend_kind() -> String {
    "memory".to_string()
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub with_target: bool,
    #[serde(default)]
    pub with_thread_ids: bool,
    #[serde(default = "default_true")]
    pub with_file: bool,
    #[serde(default = "default_true")]
    pub with_line_number: bool,
    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: false,
            with_thread_ids: false,
            with_file: true,
            with_line_number: true,
            json: false,
        }
    }
}

/// 瞬时故障重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 最大尝试次数（包含首次）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 初始退避（毫秒）
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// 最大退避（毫秒）
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// 匹配服务配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatchingServiceConfig {
    /// 服务名称
    #[serde(default)]
    pub service_name: Option<String>,
    /// 使用的后端配置名称
    #[serde(default)]
    pub backend: Option<String>,
    /// 单条消息最大字符数
    #[serde(default)]
    pub max_message_chars: Option<usize>,
    /// 发现页默认条数
    #[serde(default)]
    pub discover_limit: Option<usize>,
    /// 会话列表是否折叠旧版本重复单聊
    #[serde(default)]
    pub dedupe_legacy_threads: Option<bool>,
}

/// 服务配置集合
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicesConfig {
    /// 匹配服务配置
    #[serde(default)]
    pub matching: Option<MatchingServiceConfig>,
}

/// Affinity 应用配置主结构体
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 后端配置映射
    #[serde(default)]
    pub backend: HashMap<String, BackendProfileConfig>,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 重试配置
    #[serde(default)]
    pub retry: RetryConfig,
    /// 服务配置
    #[serde(default)]
    pub services: ServicesConfig,
}

impl AppConfig {
    /// 获取后端配置
    pub fn backend_profile(&self, name: &str) -> Option<&BackendProfileConfig> {
        self.backend.get(name)
    }

    /// 获取匹配服务配置
    pub fn matching_service(&self) -> MatchingServiceConfig {
        self.services.matching.clone().unwrap_or_default()
    }

    /// 校验服务配置中引用的后端是否存在
    pub fn validate_references(&self) -> Result<()> {
        if let Some(name) = self.matching_service().backend {
            if !self.backend.contains_key(&name) {
                return Err(anyhow!(
                    "services.matching references unknown backend profile '{}'",
                    name
                ));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// 确保配置有默认值
    fn ensure_defaults(&mut self) {
        if self.backend.is_empty() {
            self.backend
                .insert("default".to_string(), BackendProfileConfig {
                    kind: default_backend_kind(),
                    ..Default::default()
                });
        }
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = 1;
        }
    }
}

/// 加载配置（进程内只加载一次）
pub fn load_config(path: Option<&str>) -> &'static AppConfig {
    APP_CONFIG.get_or_init(|| load_uncached(path))
}

/// 加载配置但不写入全局实例
pub fn load_uncached(path: Option<&str>) -> AppConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![PathBuf::from("config"), PathBuf::from("config.toml")],
    };

    let mut cfg = load_with_fallback(&candidates);
    if let Err(e) = ConfigManager::load_environment_config(&mut cfg) {
        warn!("failed to load environment config: {}", e);
    }
    cfg
}

/// 使用备选方案加载配置
fn load_with_fallback(candidates: &[PathBuf]) -> AppConfig {
    for path in candidates {
        match load_config_from_source(path) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    let mut cfg = AppConfig::default();
    cfg.ensure_defaults();
    cfg
}

/// 从源加载配置
pub fn load_config_from_source(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    let mut cfg = if metadata.is_dir() {
        load_config_from_directory(path)?
    } else {
        load_config_from_file(path)?
    };
    cfg.ensure_defaults();
    Ok(cfg)
}

/// 从字符串解析配置
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let mut cfg: AppConfig = toml::from_str(content).context("invalid config format")?;
    cfg.ensure_defaults();
    Ok(cfg)
}

fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config format: {}", path.display()))
}

/// 从目录加载配置：base.toml + shared/ + services/ + overrides/
fn load_config_from_directory(path: &Path) -> Result<AppConfig> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;

    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("shared"))?;
    merge_directory(&mut merged, &path.join("services"))?;
    merge_directory(&mut merged, &path.join("overrides"))?;

    merged
        .try_into()
        .with_context(|| format!("invalid configuration after merging {}", path.display()))
}

fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    // 按文件名顺序合并，后者覆盖前者
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))
}

/// 深度合并 TOML 值
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "affinity-config-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_config_with_defaults() {
        let cfg = parse_config(
            r#"
            [services.matching]
            max_message_chars = 500
            "#,
        )
        .unwrap();

        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.matching_service().max_message_chars, Some(500));
        assert_eq!(cfg.backend_profile("default").unwrap().kind, "memory");
    }

    #[test]
    fn test_validate_unknown_backend_reference() {
        let cfg = parse_config(
            r#"
            [backend.primary]
            kind = "memory"

            [services.matching]
            backend = "missing"
            "#,
        )
        .unwrap();

        assert!(cfg.validate_references().is_err());
    }

    #[test]
    fn test_merge_value_overrides_nested_keys() {
        let mut base: Value = toml::from_str(
            r#"
            [retry]
            max_attempts = 3
            base_delay_ms = 50
            "#,
        )
        .unwrap();
        let overlay: Value = toml::from_str(
            r#"
            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        merge_value(&mut base, overlay);

        let retry = base.get("retry").unwrap();
        assert_eq!(retry.get("max_attempts").unwrap().as_integer(), Some(5));
        assert_eq!(retry.get("base_delay_ms").unwrap().as_integer(), Some(50));
    }

    #[test]
    fn test_load_config_from_directory() {
        let dir = temp_dir("dir");
        fs::write(
            dir.join("base.toml"),
            "[logging]\nlevel = \"debug\"\n\n[backend.default]\nkind = \"memory\"\n",
        )
        .unwrap();
        fs::create_dir_all(dir.join("services")).unwrap();
        fs::write(
            dir.join("services").join("matching.toml"),
            "[services.matching]\ndiscover_limit = 7\n",
        )
        .unwrap();
        fs::create_dir_all(dir.join("overrides")).unwrap();
        fs::write(
            dir.join("overrides").join("local.toml"),
            "[logging]\nlevel = \"warn\"\n",
        )
        .unwrap();

        let cfg = load_config_from_source(&dir).unwrap();
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.matching_service().discover_limit, Some(7));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_source_falls_back_to_defaults() {
        let cfg = load_with_fallback(&[PathBuf::from("/nonexistent/affinity.toml")]);
        assert!(cfg.backend_profile("default").is_some());
        assert_eq!(cfg.retry.max_attempts, 3);
    }
}
