use crate::domain::model::UserRole;

/// 点赞关系查询
#[derive(Debug, Clone)]
pub struct HasLikedQuery {
    pub liker_id: String,
    pub target_id: String,
}

/// 点赞集合查询
#[derive(Debug, Clone)]
pub struct LikedSetQuery {
    pub user_id: String,
}

/// 资料查询
#[derive(Debug, Clone)]
pub struct GetProfileQuery {
    pub user_id: String,
}

/// 发现页查询
#[derive(Debug, Clone)]
pub struct DiscoverQuery {
    pub user_id: String,
    pub limit: Option<usize>,
    pub role: Option<UserRole>,
}

/// 匹配列表查询
#[derive(Debug, Clone)]
pub struct ListMatchesQuery {
    pub user_id: String,
}

/// 会话列表查询
#[derive(Debug, Clone)]
pub struct ListThreadsQuery {
    pub user_id: String,
}

/// 单聊查找
#[derive(Debug, Clone)]
pub struct FindDirectThreadQuery {
    pub user_id: String,
    pub other_user_id: String,
}

/// 消息列表查询
#[derive(Debug, Clone)]
pub struct ListMessagesQuery {
    pub thread_id: String,
    pub limit: Option<usize>,
}
