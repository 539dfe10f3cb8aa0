//! 后端协作方接口（"Profile & Messaging Store"）
//!
//! 领域服务只依赖这些 trait，通过构造函数注入，测试时替换为内存实现。

mod subscription;

pub use subscription::Subscription;

use affinity_core::{AffinityError, AffinityResult};
use async_trait::async_trait;

use crate::domain::model::{
    CreateOutcome, LikeEdge, Message, MessageDraft, Thread, ThreadDraft, UserProfile,
};

/// 认证会话
pub trait AuthSession: Send + Sync {
    fn current_user_id(&self) -> Option<String>;

    /// 获取当前用户，未登录返回 `Unauthenticated`
    fn require_user(&self) -> AffinityResult<String> {
        self.current_user_id()
            .ok_or_else(|| AffinityError::Unauthenticated("no signed-in user".to_string()))
    }
}

/// 用户资料仓储（users/{id}）
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn put_profile(&self, profile: &UserProfile) -> AffinityResult<()>;

    async fn get_profile(&self, user_id: &str) -> AffinityResult<Option<UserProfile>>;

    async fn list_profiles(&self) -> AffinityResult<Vec<UserProfile>>;
}

/// 点赞仓储（users/{liker}/likes/{target}），文档键即目标用户 ID
#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// upsert，时间戳由后端生成
    async fn upsert_like(&self, liker_id: &str, target_id: &str) -> AffinityResult<LikeEdge>;

    async fn get_like(&self, liker_id: &str, target_id: &str) -> AffinityResult<Option<LikeEdge>>;

    async fn list_likes(&self, liker_id: &str) -> AffinityResult<Vec<LikeEdge>>;

    async fn watch_likes(&self, liker_id: &str) -> AffinityResult<Subscription<Vec<LikeEdge>>>;
}

/// 会话仓储（chats/{id}）
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    /// 原子条件写入：文档不存在时创建，存在时返回已有文档
    async fn create_thread_if_absent(
        &self,
        draft: &ThreadDraft,
    ) -> AffinityResult<CreateOutcome<Thread>>;

    async fn get_thread(&self, thread_id: &str) -> AffinityResult<Option<Thread>>;

    /// 包含该用户的全部单聊（未去重）
    async fn list_direct_threads(&self, user_id: &str) -> AffinityResult<Vec<Thread>>;

    /// 更新会话摘要，last_message_at 由后端生成
    async fn update_summary(&self, thread_id: &str, last_message: &str) -> AffinityResult<()>;

    async fn watch_direct_threads(&self, user_id: &str)
    -> AffinityResult<Subscription<Vec<Thread>>>;
}

/// 消息仓储（chats/{id}/messages/{id}）
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加消息，created_at 由后端生成
    async fn append_message(&self, draft: &MessageDraft) -> AffinityResult<Message>;

    /// 按创建时间升序；指定 limit 时返回最近的 limit 条
    async fn list_messages(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> AffinityResult<Vec<Message>>;

    async fn watch_messages(&self, thread_id: &str) -> AffinityResult<Subscription<Vec<Message>>>;
}
