//! 配置管理器 - 负责处理不同环境下的配置选择和覆盖
//!
//! 该模块提供了配置管理功能，包括：
//! - 根据环境变量选择后端配置
//! - 加载环境特定配置并合并

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use toml::Value;

use super::{AppConfig, BackendProfileConfig, merge_value};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 根据环境变量或配置选择后端配置
    ///
    /// 优先级：
    /// 1. 环境变量 AFFINITY_BACKEND_PROFILE 指定的配置
    /// 2. 配置文件中指定的配置
    /// 3. 名为 default 的配置
    pub fn select_backend_config(
        config: &AppConfig,
        profile_name: Option<&str>,
    ) -> Option<BackendProfileConfig> {
        if let Ok(env_profile) = env::var("AFFINITY_BACKEND_PROFILE") {
            if let Some(profile) = config.backend_profile(&env_profile) {
                return Some(profile.clone());
            }
        }

        profile_name
            .and_then(|name| config.backend_profile(name))
            .or_else(|| config.backend_profile("default"))
            .cloned()
    }

    /// 获取当前环境名称，未设置时为 "development"
    pub fn get_environment() -> String {
        env::var("AFFINITY_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 加载 config/environments/{environment}.toml 并合并到基础配置
    pub fn load_environment_config(base_config: &mut AppConfig) -> Result<()> {
        let env = Self::get_environment();
        let env_config_path = format!("config/environments/{}.toml", env);
        Self::apply_overlay_file(base_config, Path::new(&env_config_path))
    }

    /// 将覆盖文件合并到已有配置；文件不存在时不做任何事
    pub fn apply_overlay_file(base_config: &mut AppConfig, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取环境配置文件: {}", path.display()))?;
        let overlay: Value = toml::from_str(&content)
            .with_context(|| format!("无效的环境配置格式: {}", path.display()))?;

        let mut merged =
            Value::try_from(&*base_config).context("unable to serialize base configuration")?;
        merge_value(&mut merged, overlay);

        let mut cfg: AppConfig = merged
            .try_into()
            .with_context(|| format!("invalid configuration after merging {}", path.display()))?;
        cfg.ensure_defaults();
        *base_config = cfg;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_overlay_file_merges_into_base() {
        let mut cfg = parse_config(
            r#"
            [retry]
            max_attempts = 4

            [services.matching]
            max_message_chars = 100
            "#,
        )
        .unwrap();

        let path = std::env::temp_dir().join(format!("affinity-overlay-{}.toml", std::process::id()));
        fs::write(&path, "[services.matching]\ndiscover_limit = 3\n").unwrap();

        ConfigManager::apply_overlay_file(&mut cfg, &path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(cfg.retry.max_attempts, 4);
        let matching = cfg.matching_service();
        assert_eq!(matching.max_message_chars, Some(100));
        assert_eq!(matching.discover_limit, Some(3));
    }

    #[test]
    fn test_missing_overlay_is_noop() {
        let mut cfg = parse_config("").unwrap();
        ConfigManager::apply_overlay_file(&mut cfg, Path::new("/nonexistent/env.toml")).unwrap();
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    fn test_select_backend_falls_back_to_default() {
        let cfg = parse_config(
            r#"
            [backend.default]
            kind = "memory"
            project_id = "affinity-dev"
            "#,
        )
        .unwrap();

        let selected = ConfigManager::select_backend_config(&cfg, Some("unknown")).unwrap();
        assert_eq!(selected.project_id.as_deref(), Some("affinity-dev"));
    }
}
