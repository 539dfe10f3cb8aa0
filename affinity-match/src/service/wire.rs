//! Wire 风格的依赖注入模块
//!
//! 按依赖顺序构建仓储、领域服务和处理器。每个设备会话一套上下文，
//! 同一进程内的多个会话共享一个后端。

use std::sync::Arc;

use affinity_core::config::AppConfig;
use affinity_core::{AffinityError, AffinityResult};
use tracing::info;

use crate::application::handlers::{MatchCommandHandler, MatchQueryHandler};
use crate::config::MatchServiceConfig;
use crate::domain::repository::{
    AuthSession, LikeRepository, MessageRepository, ProfileRepository, ThreadRepository,
};
use crate::domain::service::{
    LikeDomainService, MatchDetector, MessageChannel, ProfileDomainService, ThreadRegistry,
};
use crate::infrastructure::persistence::memory::{BackendSession, InMemoryBackend};

/// 应用上下文 - 一个设备会话的全部服务
pub struct ApplicationContext {
    pub session: Arc<BackendSession>,
    pub command_handler: Arc<MatchCommandHandler>,
    pub query_handler: Arc<MatchQueryHandler>,
}

/// 已初始化的运行时：配置 + 共享后端
pub struct MatchRuntime {
    pub config: Arc<MatchServiceConfig>,
    pub backend: Arc<InMemoryBackend>,
}

impl MatchRuntime {
    /// 新建一个设备会话（未登录）
    pub fn connect(&self) -> ApplicationContext {
        let session = Arc::new(BackendSession::new(self.backend.clone()));
        build_context(&self.config, session)
    }
}

/// 构建运行时
///
/// # 参数
/// * `app_config` - 应用配置
pub fn initialize(app_config: &AppConfig) -> AffinityResult<MatchRuntime> {
    // 1. 加载服务配置
    let config = Arc::new(MatchServiceConfig::from_app_config(app_config)?);

    // 2. 创建后端
    let backend = match config.backend.kind.as_str() {
        "memory" => Arc::new(InMemoryBackend::new()),
        other => {
            return Err(AffinityError::Config(format!(
                "unsupported backend kind '{}'",
                other
            )));
        }
    };

    info!(
        service = %config.service_name,
        backend = %config.backend.kind,
        project_id = config.backend.project_id.as_deref().unwrap_or("-"),
        "Match runtime initialized"
    );

    Ok(MatchRuntime { config, backend })
}

/// 为一个设备会话构建应用上下文
pub fn build_context(config: &MatchServiceConfig, session: Arc<BackendSession>) -> ApplicationContext {
    let domain_config = config.domain_config();

    // 1. 仓储（同一会话实现全部接口）
    let auth: Arc<dyn AuthSession> = session.clone();
    let profile_repo: Arc<dyn ProfileRepository> = session.clone();
    let like_repo: Arc<dyn LikeRepository> = session.clone();
    let thread_repo: Arc<dyn ThreadRepository> = session.clone();
    let message_repo: Arc<dyn MessageRepository> = session.clone();

    // 2. 领域服务
    let likes = Arc::new(LikeDomainService::new(auth.clone(), like_repo.clone()));
    let threads = Arc::new(ThreadRegistry::new(
        thread_repo.clone(),
        profile_repo.clone(),
        domain_config.clone(),
    ));
    let detector = Arc::new(MatchDetector::new(
        likes.clone(),
        threads.clone(),
        config.retry,
    ));
    let channel = Arc::new(MessageChannel::new(
        auth.clone(),
        message_repo,
        thread_repo,
        domain_config.clone(),
    ));
    let profiles = Arc::new(ProfileDomainService::new(
        auth,
        profile_repo,
        like_repo,
        domain_config,
    ));

    // 3. 命令处理器
    let command_handler = Arc::new(MatchCommandHandler::new(
        detector,
        threads.clone(),
        channel.clone(),
        profiles.clone(),
        config.retry,
    ));

    // 4. 查询处理器
    let query_handler = Arc::new(MatchQueryHandler::new(
        likes,
        threads,
        channel,
        profiles,
        config.retry,
    ));

    ApplicationContext {
        session,
        command_handler,
        query_handler,
    }
}
