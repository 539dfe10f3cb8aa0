use std::env;

use affinity_core::config::{AppConfig, BackendProfileConfig, ConfigManager};
use affinity_core::{AffinityError, AffinityResult, RetryPolicy};

use crate::domain::model::MatchDomainConfig;

#[derive(Clone, Debug)]
pub struct MatchServiceConfig {
    pub service_name: String,
    pub backend: BackendProfileConfig,
    pub max_message_chars: usize,
    pub discover_limit: usize,
    pub dedupe_legacy_threads: bool,
    pub retry: RetryPolicy,
}

impl MatchServiceConfig {
    /// 从应用配置加载，`AFFINITY_MATCH_*` 环境变量优先
    pub fn from_app_config(app: &AppConfig) -> AffinityResult<Self> {
        let service_config = app.matching_service();

        let service_name = env::var("AFFINITY_MATCH_SERVICE_NAME")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| service_config.service_name.clone())
            .unwrap_or_else(|| "affinity-match".to_string());

        let backend = ConfigManager::select_backend_config(app, service_config.backend.as_deref())
            .ok_or_else(|| AffinityError::Config("no backend profile configured".to_string()))?;

        let max_message_chars = env::var("AFFINITY_MATCH_MAX_MESSAGE_CHARS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .or(service_config.max_message_chars)
            .unwrap_or(4_000);
        if max_message_chars == 0 {
            return Err(AffinityError::Config(
                "max_message_chars must be greater than zero".to_string(),
            ));
        }

        let discover_limit = env::var("AFFINITY_MATCH_DISCOVER_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .or(service_config.discover_limit)
            .unwrap_or(20);

        let dedupe_legacy_threads = env::var("AFFINITY_MATCH_DEDUPE_LEGACY_THREADS")
            .ok()
            .and_then(|v| parse_bool(&v))
            .or(service_config.dedupe_legacy_threads)
            .unwrap_or(true);

        Ok(Self {
            service_name,
            backend,
            max_message_chars,
            discover_limit,
            dedupe_legacy_threads,
            retry: RetryPolicy::from(&app.retry),
        })
    }

    pub fn domain_config(&self) -> MatchDomainConfig {
        MatchDomainConfig {
            max_message_chars: self.max_message_chars,
            discover_limit: self.discover_limit,
            dedupe_legacy_threads: self.dedupe_legacy_threads,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
