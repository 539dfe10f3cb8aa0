//! Affinity Core 公共库
//!
//! 提供统一的错误分类、配置加载、日志初始化和通用工具函数

pub mod config;
pub mod error;
pub mod tracing;
pub mod utils;

pub use config::{
    AppConfig, BackendProfileConfig, ConfigManager, LoggingConfig, MatchingServiceConfig,
    RetryConfig, load_config,
};
pub use error::{AffinityError, AffinityResult, ErrorKind};
pub use utils::*;
