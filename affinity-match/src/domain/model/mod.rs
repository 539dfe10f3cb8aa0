use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户角色
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    ContentCreator,
    Enterprise,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::ContentCreator => "content_creator",
            UserRole::Enterprise => "enterprise",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "content_creator" | "content-creator" | "creator" => Some(UserRole::ContentCreator),
            "enterprise" => Some(UserRole::Enterprise),
            _ => None,
        }
    }
}

/// 用户资料
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub role: UserRole,
    pub bio: String,
    pub tags: BTreeSet<String>,
    pub photo_url: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            bio: String::new(),
            tags: BTreeSet::new(),
            photo_url: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn with_photo_url(mut self, photo_url: impl Into<String>) -> Self {
        self.photo_url = Some(photo_url.into());
        self
    }
}

/// 标签归一化：去首尾空白、小写、去重、丢弃空串
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// 单向点赞关系（liker -> liked）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikeEdge {
    pub liker_id: String,
    pub liked_id: String,
    pub created_at: DateTime<Utc>,
}

/// 当前用户点赞过的用户集合
pub type LikedSet = BTreeSet<String>;

/// 单聊会话
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thread {
    pub id: String,
    pub participants: Vec<String>,
    pub is_group: bool,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    /// 参与者头像缓存（user_id -> photo_url）
    pub participant_photos: HashMap<String, String>,
}

impl Thread {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// 是否为 {a, b} 两人之间的单聊
    pub fn is_direct_between(&self, user_a: &str, user_b: &str) -> bool {
        !self.is_group
            && self.participants.len() == 2
            && self.has_participant(user_a)
            && self.has_participant(user_b)
    }

    /// 单聊中的对方
    pub fn counterpart(&self, me: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != me)
    }

    /// 排序后的参与者对，用于识别重复会话
    pub fn pair(&self) -> Option<(&str, &str)> {
        match self.participants.as_slice() {
            [a, b] if a <= b => Some((a.as_str(), b.as_str())),
            [a, b] => Some((b.as_str(), a.as_str())),
            _ => None,
        }
    }
}

/// 新建单聊的草稿
#[derive(Clone, Debug)]
pub struct ThreadDraft {
    pub id: String,
    pub participants: Vec<String>,
    pub participant_photos: HashMap<String, String>,
}

/// 条件创建结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome<T> {
    Created(T),
    Existing(T),
}

impl<T> CreateOutcome<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            CreateOutcome::Created(value) | CreateOutcome::Existing(value) => value,
        }
    }
}

/// find-or-create 的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadHandle {
    pub thread_id: String,
    pub created: bool,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Sent,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(MessageStatus::Sent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageKind::Text),
            _ => None,
        }
    }
}

/// 会话中的一条消息，创建后不可变
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub text: String,
    pub status: MessageStatus,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

/// 待追加的消息
#[derive(Clone, Debug)]
pub struct MessageDraft {
    pub thread_id: String,
    pub sender_id: String,
    pub text: String,
}

/// 点赞后的匹配判定结果
#[derive(Debug)]
pub enum MatchOutcome {
    /// 对方尚未回赞
    Pending,
    /// 互相点赞，会话已存在或刚创建
    Matched(ThreadHandle),
    /// 点赞已记录，但互赞检查或建会话失败；点赞不会回滚
    LikeRecordedCheckFailed(affinity_core::AffinityError),
}

impl MatchOutcome {
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            MatchOutcome::Matched(handle) => Some(handle.thread_id.as_str()),
            _ => None,
        }
    }
}

/// 发送结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// 空白消息，未写入
    Skipped,
    Sent(Message),
}

/// 发现页候选
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoverCandidate {
    pub profile: UserProfile,
    /// 标签 Jaccard 相似度，取值 [0, 1]
    pub score: f64,
}

/// 领域配置
#[derive(Clone, Debug)]
pub struct MatchDomainConfig {
    pub max_message_chars: usize,
    pub discover_limit: usize,
    pub dedupe_legacy_threads: bool,
}

impl MatchDomainConfig {
    pub fn new(max_message_chars: usize, discover_limit: usize) -> Self {
        Self {
            max_message_chars,
            discover_limit,
            dedupe_legacy_threads: true,
        }
    }
}

impl Default for MatchDomainConfig {
    fn default() -> Self {
        Self::new(4_000, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: &str, participants: &[&str]) -> Thread {
        Thread {
            id: id.to_string(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            is_group: false,
            last_message: String::new(),
            last_message_at: Utc::now(),
            participant_photos: HashMap::new(),
        }
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["  Rust ", "rust", "", "Design", "   "]);
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec!["design".to_string(), "rust".to_string()]
        );
    }

    #[test]
    fn test_thread_pair_is_sorted() {
        let t = thread("t", &["u2", "u1"]);
        assert_eq!(t.pair(), Some(("u1", "u2")));
        assert!(t.is_direct_between("u1", "u2"));
        assert!(t.is_direct_between("u2", "u1"));
        assert!(!t.is_direct_between("u1", "u3"));
        assert_eq!(t.counterpart("u1"), Some("u2"));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(UserRole::from_str("Enterprise"), Some(UserRole::Enterprise));
        assert_eq!(
            UserRole::from_str("content-creator"),
            Some(UserRole::ContentCreator)
        );
        assert_eq!(UserRole::from_str("admin"), None);
    }
}
