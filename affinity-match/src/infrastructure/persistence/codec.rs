//! 文档编解码边界
//!
//! 领域类型与后端 JSON 文档之间的唯一转换点。每种文档都带 `schema_version`，
//! 缺省视为 1；解码时统一做必填字段和取值校验，失败返回 `InvalidDocument`。

use std::collections::HashMap;

use affinity_core::{AffinityError, AffinityResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::paths::{self, is_valid_segment};
use crate::domain::model::{
    LikeEdge, Message, MessageDraft, MessageKind, MessageStatus, Thread, ThreadDraft, UserProfile,
    UserRole, normalize_tags,
};

/// 当前写入的文档版本
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// 由后端填充的时间字段
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_LAST_MESSAGE_AT: &str = "last_message_at";

fn default_schema_version() -> u32 {
    1
}

fn default_status() -> String {
    MessageStatus::Sent.as_str().to_string()
}

fn default_kind() -> String {
    MessageKind::Text.as_str().to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct UserDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    display_name: String,
    role: String,
    #[serde(default)]
    bio: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    photo_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LikeDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    liked_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ThreadDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    participants: Vec<String>,
    #[serde(default)]
    is_group: bool,
    #[serde(default)]
    last_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    participant_photos: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    sender_id: String,
    text: String,
    #[serde(default = "default_status")]
    status: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

fn to_value<T: Serialize>(doc: &T) -> AffinityResult<Value> {
    serde_json::to_value(doc).map_err(|e| AffinityError::Other(e.into()))
}

fn parse<'a, T: Deserialize<'a>>(path: &str, data: &'a Value) -> AffinityResult<T> {
    T::deserialize(data).map_err(|e| AffinityError::invalid_document(path, e.to_string()))
}

fn check_version(path: &str, version: u32) -> AffinityResult<()> {
    if version > CURRENT_SCHEMA_VERSION {
        return Err(AffinityError::invalid_document(
            path,
            format!(
                "unsupported schema_version {} (supported up to {})",
                version, CURRENT_SCHEMA_VERSION
            ),
        ));
    }
    Ok(())
}

fn require(path: &str, ok: bool, reason: &str) -> AffinityResult<()> {
    if ok {
        Ok(())
    } else {
        Err(AffinityError::invalid_document(path, reason))
    }
}

/// 取路径中的第 n 段（从 0 开始）
fn segment(path: &str, index: usize) -> AffinityResult<&str> {
    path.split('/')
        .nth(index)
        .filter(|s| is_valid_segment(s))
        .ok_or_else(|| AffinityError::invalid_document(path, "malformed document path"))
}

// ---------------------------------------------------------------------------
// users/{id}
// ---------------------------------------------------------------------------

pub fn encode_profile(profile: &UserProfile) -> AffinityResult<Value> {
    to_value(&UserDocument {
        schema_version: CURRENT_SCHEMA_VERSION,
        display_name: profile.display_name.clone(),
        role: profile.role.as_str().to_string(),
        bio: profile.bio.clone(),
        tags: profile.tags.iter().cloned().collect(),
        photo_url: profile.photo_url.clone(),
    })
}

pub fn decode_profile(path: &str, data: &Value) -> AffinityResult<UserProfile> {
    let doc: UserDocument = parse(path, data)?;
    check_version(path, doc.schema_version)?;

    let id = segment(path, 1)?.to_string();
    require(
        path,
        !doc.display_name.trim().is_empty(),
        "display_name must not be empty",
    )?;
    let role = UserRole::from_str(&doc.role)
        .ok_or_else(|| AffinityError::invalid_document(path, format!("unknown role '{}'", doc.role)))?;

    Ok(UserProfile {
        id,
        display_name: doc.display_name,
        role,
        bio: doc.bio,
        tags: normalize_tags(doc.tags),
        photo_url: doc.photo_url.filter(|url| !url.is_empty()),
    })
}

// ---------------------------------------------------------------------------
// users/{liker}/likes/{target}
// ---------------------------------------------------------------------------

/// 点赞文档，created_at 由后端填充
pub fn encode_like(target_id: &str) -> AffinityResult<Value> {
    to_value(&LikeDocument {
        schema_version: CURRENT_SCHEMA_VERSION,
        liked_id: Some(target_id.to_string()),
        created_at: None,
    })
}

pub fn decode_like(path: &str, data: &Value) -> AffinityResult<LikeEdge> {
    let doc: LikeDocument = parse(path, data)?;
    check_version(path, doc.schema_version)?;

    let liker_id = segment(path, 1)?.to_string();
    let liked_id = segment(path, 3)?.to_string();
    if let Some(stored) = &doc.liked_id {
        require(path, *stored == liked_id, "liked_id does not match document key")?;
    }
    let created_at = doc
        .created_at
        .ok_or_else(|| AffinityError::invalid_document(path, "missing created_at"))?;

    Ok(LikeEdge {
        liker_id,
        liked_id,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// chats/{id}
// ---------------------------------------------------------------------------

/// 新会话文档，last_message_at 由后端填充
pub fn encode_thread_draft(draft: &ThreadDraft) -> AffinityResult<Value> {
    to_value(&ThreadDocument {
        schema_version: CURRENT_SCHEMA_VERSION,
        participants: draft.participants.clone(),
        is_group: false,
        last_message: String::new(),
        last_message_at: None,
        participant_photos: draft.participant_photos.clone(),
    })
}

pub fn decode_thread(path: &str, data: &Value) -> AffinityResult<Thread> {
    let doc: ThreadDocument = parse(path, data)?;
    check_version(path, doc.schema_version)?;

    let id = segment(path, 1)?.to_string();
    require(
        path,
        doc.participants.iter().all(|p| is_valid_segment(p)),
        "participant ids must not be empty",
    )?;
    if !doc.is_group {
        require(
            path,
            doc.participants.len() == 2 && doc.participants[0] != doc.participants[1],
            "direct thread needs exactly two distinct participants",
        )?;
    }
    let last_message_at = doc
        .last_message_at
        .ok_or_else(|| AffinityError::invalid_document(path, "missing last_message_at"))?;

    Ok(Thread {
        id,
        participants: doc.participants,
        is_group: doc.is_group,
        last_message: doc.last_message,
        last_message_at,
        participant_photos: doc.participant_photos,
    })
}

// ---------------------------------------------------------------------------
// chats/{id}/messages/{id}
// ---------------------------------------------------------------------------

/// 消息文档，created_at 由后端填充
pub fn encode_message_draft(draft: &MessageDraft) -> AffinityResult<Value> {
    to_value(&MessageDocument {
        schema_version: CURRENT_SCHEMA_VERSION,
        sender_id: draft.sender_id.clone(),
        text: draft.text.clone(),
        status: default_status(),
        kind: default_kind(),
        created_at: None,
    })
}

pub fn decode_message(path: &str, data: &Value) -> AffinityResult<Message> {
    let doc: MessageDocument = parse(path, data)?;
    check_version(path, doc.schema_version)?;

    let thread_id = segment(path, 1)?.to_string();
    let id = segment(path, 3)?.to_string();
    require(path, !doc.sender_id.is_empty(), "sender_id must not be empty")?;
    require(path, !doc.text.trim().is_empty(), "text must not be empty")?;
    let status = MessageStatus::from_str(&doc.status).ok_or_else(|| {
        AffinityError::invalid_document(path, format!("unknown status '{}'", doc.status))
    })?;
    let kind = MessageKind::from_str(&doc.kind).ok_or_else(|| {
        AffinityError::invalid_document(path, format!("unknown message type '{}'", doc.kind))
    })?;
    let created_at = doc
        .created_at
        .ok_or_else(|| AffinityError::invalid_document(path, "missing created_at"))?;

    Ok(Message {
        id,
        thread_id,
        sender_id: doc.sender_id,
        text: doc.text,
        status,
        kind,
        created_at,
    })
}

/// 会话文档路径（校验 ID）
pub fn checked_thread_path(thread_id: &str) -> AffinityResult<String> {
    if !is_valid_segment(thread_id) {
        return Err(AffinityError::InvalidArgument(format!(
            "invalid thread id '{}'",
            thread_id
        )));
    }
    Ok(paths::thread_path(thread_id))
}

#[cfg(test)]
mod tests {
    use affinity_core::ErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_profile_encode_decode() {
        let profile = UserProfile::new("u1", "Ada", UserRole::ContentCreator)
            .with_tags(["Rust", "music"])
            .with_bio("hello");
        let value = encode_profile(&profile).unwrap();
        assert_eq!(value["schema_version"], json!(1));
        assert_eq!(value["role"], json!("content_creator"));

        let decoded = decode_profile("users/u1", &value).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn test_profile_validation() {
        let err = decode_profile(
            "users/u1",
            &json!({ "display_name": "  ", "role": "enterprise" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);

        let err = decode_profile(
            "users/u1",
            &json!({ "display_name": "Ada", "role": "admin" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown role"));
    }

    #[test]
    fn test_missing_schema_version_reads_as_v1() {
        let profile = decode_profile(
            "users/legacy",
            &json!({ "display_name": "Old", "role": "enterprise", "tags": ["A", "a"] }),
        )
        .unwrap();
        assert_eq!(profile.tags.len(), 1);
    }

    #[test]
    fn test_newer_schema_version_is_rejected() {
        let err = decode_profile(
            "users/u1",
            &json!({ "schema_version": 2, "display_name": "Ada", "role": "enterprise" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);
        assert!(err.to_string().contains("schema_version 2"));
    }

    #[test]
    fn test_like_key_must_match_payload() {
        let err = decode_like(
            "users/u1/likes/u2",
            &json!({ "liked_id": "u3", "created_at": "2024-01-01T00:00:00Z" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);

        let edge = decode_like(
            "users/u1/likes/u2",
            &json!({ "created_at": "2024-01-01T00:00:00.000001Z" }),
        )
        .unwrap();
        assert_eq!(edge.liker_id, "u1");
        assert_eq!(edge.liked_id, "u2");
    }

    #[test]
    fn test_direct_thread_requires_two_distinct_participants() {
        let err = decode_thread(
            "chats/t1",
            &json!({
                "participants": ["u1", "u1"],
                "last_message_at": "2024-01-01T00:00:00Z"
            }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);

        let thread = decode_thread(
            "chats/t1",
            &json!({
                "participants": ["u1", "u2"],
                "last_message_at": "2024-01-01T00:00:00Z"
            }),
        )
        .unwrap();
        assert!(!thread.is_group);
        assert_eq!(thread.last_message, "");
    }

    #[test]
    fn test_thread_draft_leaves_timestamp_to_backend() {
        let draft = ThreadDraft {
            id: "u1_u2".into(),
            participants: vec!["u1".into(), "u2".into()],
            participant_photos: HashMap::new(),
        };
        let value = encode_thread_draft(&draft).unwrap();
        assert!(value.get(FIELD_LAST_MESSAGE_AT).is_none());
        assert_eq!(value["is_group"], json!(false));
        assert_eq!(value["last_message"], json!(""));
    }

    #[test]
    fn test_message_decode() {
        let message = decode_message(
            "chats/u1_u2/messages/m1",
            &json!({
                "sender_id": "u1",
                "text": "hi",
                "status": "sent",
                "type": "text",
                "created_at": "2024-01-01T00:00:00Z"
            }),
        )
        .unwrap();
        assert_eq!(message.thread_id, "u1_u2");
        assert_eq!(message.id, "m1");
        assert_eq!(message.status, MessageStatus::Sent);

        let err = decode_message(
            "chats/u1_u2/messages/m2",
            &json!({ "sender_id": "u1", "text": "hi", "type": "image", "created_at": "2024-01-01T00:00:00Z" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown message type"));
    }
}
