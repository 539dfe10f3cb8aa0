//! 文档路径约定
//!
//! ```text
//! users/{id}
//! users/{id}/likes/{targetId}
//! chats/{id}
//! chats/{id}/messages/{id}
//! ```

pub const USERS: &str = "users";
pub const LIKES: &str = "likes";
pub const CHATS: &str = "chats";
pub const MESSAGES: &str = "messages";

pub fn user_path(user_id: &str) -> String {
    format!("{USERS}/{user_id}")
}

pub fn likes_collection(liker_id: &str) -> String {
    format!("{USERS}/{liker_id}/{LIKES}")
}

pub fn like_path(liker_id: &str, target_id: &str) -> String {
    format!("{}/{target_id}", likes_collection(liker_id))
}

pub fn thread_path(thread_id: &str) -> String {
    format!("{CHATS}/{thread_id}")
}

pub fn messages_collection(thread_id: &str) -> String {
    format!("{CHATS}/{thread_id}/{MESSAGES}")
}

/// 拆分出父集合路径和文档 ID
pub fn split_document_path(path: &str) -> Option<(&str, &str)> {
    path.rsplit_once('/')
}

/// 路径中的 ID 段不能为空，也不能包含分隔符
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/')
}
