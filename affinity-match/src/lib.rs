//! # Affinity Match
//!
//! 点赞 → 互相匹配 → 单聊创建的完整流程。
//!
//! - **domain层**：领域模型、后端仓储接口、领域服务（点赞、匹配检测、会话注册表、消息通道、资料）
//! - **application层**：命令 / 查询处理器
//! - **infrastructure层**：文档编解码、进程内后端
//! - **service层**：依赖注入和启动

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod service;

pub use domain::model::{
    LikeEdge, MatchOutcome, Message, SendOutcome, Thread, ThreadHandle, UserProfile, UserRole,
};
pub use domain::repository::Subscription;
pub use infrastructure::persistence::memory::{BackendSession, InMemoryBackend};
