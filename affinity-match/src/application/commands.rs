use crate::domain::model::UserProfile;

/// 点赞命令
#[derive(Debug, Clone)]
pub struct LikeUserCommand {
    pub liker_id: String,
    pub target_id: String,
}

/// 主动发起单聊命令
#[derive(Debug, Clone)]
pub struct StartChatCommand {
    pub user_id: String,
    pub other_user_id: String,
}

/// 发送消息命令
#[derive(Debug, Clone)]
pub struct SendMessageCommand {
    pub thread_id: String,
    pub sender_id: String,
    pub text: String,
}

/// 补齐匹配会话命令（启动时执行）
#[derive(Debug, Clone)]
pub struct ReconcileMatchesCommand {
    pub user_id: String,
}

/// 创建资料命令
#[derive(Debug, Clone)]
pub struct CreateProfileCommand {
    pub profile: UserProfile,
}

/// 编辑资料命令
#[derive(Debug, Clone)]
pub struct UpdateProfileCommand {
    pub profile: UserProfile,
}
