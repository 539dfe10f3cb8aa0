//! 访问规则
//!
//! - 所有操作都需要登录
//! - `users/{id}` 及其子集合只能由本人写入
//! - 会话只能由参与者创建、更新和读取；`chats` 查询必须按当前用户过滤
//! - 消息只能由参与者以自己的身份追加，父会话必须存在

use std::collections::BTreeMap;

use affinity_core::{AffinityError, AffinityResult};
use serde_json::Value;

use super::backend::StoredDocument;
use super::query::CollectionQuery;
use crate::infrastructure::persistence::paths::{CHATS, MESSAGES, USERS};

const FIELD_PARTICIPANTS: &str = "participants";
const FIELD_SENDER_ID: &str = "sender_id";

type Documents = BTreeMap<String, StoredDocument>;

/// 路径的语义分类
enum Target<'a> {
    User { owner: &'a str },
    Chat,
    ChatMessages { chat_id: &'a str },
    Unknown,
}

fn classify(path: &str) -> Target<'_> {
    let segments: Vec<&str> = path.split('/').collect();
    match segments.as_slice() {
        [USERS, owner, ..] => Target::User { owner: *owner },
        [CHATS, _] => Target::Chat,
        [CHATS, chat_id, MESSAGES] | [CHATS, chat_id, MESSAGES, _] => Target::ChatMessages {
            chat_id: *chat_id,
        },
        _ => Target::Unknown,
    }
}

pub fn require_auth(caller: Option<&str>) -> AffinityResult<&str> {
    caller.ok_or_else(|| AffinityError::Unauthenticated("request has no caller identity".into()))
}

fn lists_participant(data: &Value, user_id: &str) -> bool {
    data.get(FIELD_PARTICIPANTS)
        .and_then(Value::as_array)
        .is_some_and(|items| items.iter().any(|p| p.as_str() == Some(user_id)))
}

fn denied(caller: &str, action: &str, path: &str) -> AffinityError {
    AffinityError::PermissionDenied(format!("{caller} may not {action} {path}"))
}

fn chat_membership(documents: &Documents, caller: &str, chat_id: &str, path: &str) -> AffinityResult<()> {
    let chat_path = format!("{CHATS}/{chat_id}");
    match documents.get(&chat_path) {
        None => Err(AffinityError::NotFound(chat_path)),
        Some(chat) if lists_participant(&chat.data, caller) => Ok(()),
        Some(_) => Err(denied(caller, "access", path)),
    }
}

/// 单文档读取
pub fn check_read(documents: &Documents, caller: Option<&str>, path: &str) -> AffinityResult<()> {
    let caller = require_auth(caller)?;
    match classify(path) {
        Target::User { .. } => Ok(()),
        Target::Chat => match documents.get(path) {
            Some(chat) if !lists_participant(&chat.data, caller) => {
                Err(denied(caller, "read", path))
            }
            _ => Ok(()),
        },
        Target::ChatMessages { chat_id } => chat_membership(documents, caller, chat_id, path),
        Target::Unknown => Err(denied(caller, "read", path)),
    }
}

/// 集合查询（含实时监听）
pub fn check_query(
    documents: &Documents,
    caller: Option<&str>,
    query: &CollectionQuery,
) -> AffinityResult<()> {
    let caller = require_auth(caller)?;
    if query.collection == USERS {
        return Ok(());
    }
    if query.collection == CHATS {
        let scoped = query
            .array_contains_value(FIELD_PARTICIPANTS)
            .and_then(Value::as_str)
            == Some(caller);
        if !scoped {
            return Err(denied(caller, "list unscoped", CHATS));
        }
        return Ok(());
    }
    match classify(&query.collection) {
        Target::User { .. } => Ok(()),
        Target::ChatMessages { chat_id } => {
            chat_membership(documents, caller, chat_id, &query.collection)
        }
        _ => Err(denied(caller, "list", &query.collection)),
    }
}

/// 写入（创建 / 覆盖 / 更新）
///
/// `data` 为写入后的完整文档内容。
pub fn check_write(
    documents: &Documents,
    caller: Option<&str>,
    path: &str,
    data: &Value,
) -> AffinityResult<()> {
    let caller = require_auth(caller)?;
    match classify(path) {
        Target::User { owner } if owner == caller => Ok(()),
        Target::User { .. } => Err(denied(caller, "write", path)),
        Target::Chat => {
            let existing_ok = documents
                .get(path)
                .is_none_or(|chat| lists_participant(&chat.data, caller));
            if existing_ok && lists_participant(data, caller) {
                Ok(())
            } else {
                Err(denied(caller, "write", path))
            }
        }
        Target::ChatMessages { chat_id } => {
            chat_membership(documents, caller, chat_id, path)?;
            if data.get(FIELD_SENDER_ID).and_then(Value::as_str) == Some(caller) {
                Ok(())
            } else {
                Err(denied(caller, "send as another user to", path))
            }
        }
        Target::Unknown => Err(denied(caller, "write", path)),
    }
}
