//! 设备会话：共享后端 + 当前登录用户
//!
//! 实现全部仓储 trait，所有文档经由 codec 编解码。

use std::sync::Arc;

use affinity_core::{AffinityError, AffinityResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, instrument, warn};

use super::backend::{InMemoryBackend, StoredDocument, server_timestamp};
use super::query::{CollectionQuery, Direction};
use crate::domain::model::{
    CreateOutcome, LikeEdge, Message, MessageDraft, Thread, ThreadDraft, UserProfile,
};
use crate::domain::repository::{
    AuthSession, LikeRepository, MessageRepository, ProfileRepository, Subscription,
    ThreadRepository,
};
use crate::infrastructure::persistence::codec::{
    self, FIELD_CREATED_AT, FIELD_LAST_MESSAGE_AT,
};
use crate::infrastructure::persistence::paths;

const FIELD_PARTICIPANTS: &str = "participants";
const FIELD_LAST_MESSAGE: &str = "last_message";

pub struct BackendSession {
    backend: Arc<InMemoryBackend>,
    user_id: RwLock<Option<String>>,
}

impl BackendSession {
    pub fn new(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            backend,
            user_id: RwLock::new(None),
        }
    }

    /// 以指定用户登录（认证本身不在范围内，ID 由调用方给出）
    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        info!(user_id = %user_id, "Signed in");
        *self.user_id.write() = Some(user_id);
    }

    pub fn sign_out(&self) {
        if let Some(user_id) = self.user_id.write().take() {
            info!(user_id = %user_id, "Signed out");
        }
    }

    pub fn backend(&self) -> &Arc<InMemoryBackend> {
        &self.backend
    }

    fn caller(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// 注册监听并把原始快照解码为领域对象
    async fn subscribe<T, F>(
        &self,
        query: CollectionQuery,
        decode: F,
    ) -> AffinityResult<Subscription<Vec<T>>>
    where
        T: Send + 'static,
        F: Fn(&str, &Value) -> AffinityResult<T> + Send + Sync + 'static,
    {
        let caller = self.caller();
        let (listener_id, receiver) = self.backend.listen(caller.as_deref(), query).await?;
        let stream = WatchStream::new(receiver).map(move |docs| decode_valid(&docs, &decode));
        let backend = self.backend.clone();
        Ok(Subscription::new(stream, move || {
            backend.remove_listener(listener_id);
        }))
    }
}

/// 解码结果集，跳过无法解码的文档
fn decode_valid<T, F>(docs: &[StoredDocument], decode: F) -> Vec<T>
where
    F: Fn(&str, &Value) -> AffinityResult<T>,
{
    docs.iter()
        .filter_map(|doc| match decode(&doc.path, &doc.data) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %doc.path, error = %err, "Skipping undecodable document");
                None
            }
        })
        .collect()
}

fn with_field(mut value: Value, field: &str, field_value: Value) -> Value {
    if let Value::Object(fields) = &mut value {
        fields.insert(field.to_string(), field_value);
    }
    value
}

fn participants_query(user_id: &str) -> CollectionQuery {
    CollectionQuery::collection(paths::CHATS)
        .where_array_contains(FIELD_PARTICIPANTS, user_id)
        .order_by(FIELD_LAST_MESSAGE_AT, Direction::Descending)
}

fn decode_direct_thread(path: &str, data: &Value) -> AffinityResult<Thread> {
    let thread = codec::decode_thread(path, data)?;
    if thread.is_group {
        return Err(AffinityError::invalid_document(path, "not a direct thread"));
    }
    Ok(thread)
}

impl AuthSession for BackendSession {
    fn current_user_id(&self) -> Option<String> {
        self.caller()
    }
}

#[async_trait]
impl ProfileRepository for BackendSession {
    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    async fn put_profile(&self, profile: &UserProfile) -> AffinityResult<()> {
        let data = codec::encode_profile(profile)?;
        self.backend
            .set(self.caller().as_deref(), &paths::user_path(&profile.id), data)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_profile(&self, user_id: &str) -> AffinityResult<Option<UserProfile>> {
        let path = paths::user_path(user_id);
        self.backend
            .get(self.caller().as_deref(), &path)
            .await?
            .map(|doc| codec::decode_profile(&doc.path, &doc.data))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn list_profiles(&self) -> AffinityResult<Vec<UserProfile>> {
        let docs = self
            .backend
            .query(
                self.caller().as_deref(),
                &CollectionQuery::collection(paths::USERS),
            )
            .await?;
        Ok(decode_valid(&docs, codec::decode_profile))
    }
}

#[async_trait]
impl LikeRepository for BackendSession {
    #[instrument(skip(self))]
    async fn upsert_like(&self, liker_id: &str, target_id: &str) -> AffinityResult<LikeEdge> {
        let data = with_field(
            codec::encode_like(target_id)?,
            FIELD_CREATED_AT,
            server_timestamp(),
        );
        let doc = self
            .backend
            .set(
                self.caller().as_deref(),
                &paths::like_path(liker_id, target_id),
                data,
            )
            .await?;
        codec::decode_like(&doc.path, &doc.data)
    }

    #[instrument(skip(self))]
    async fn get_like(&self, liker_id: &str, target_id: &str) -> AffinityResult<Option<LikeEdge>> {
        self.backend
            .get(
                self.caller().as_deref(),
                &paths::like_path(liker_id, target_id),
            )
            .await?
            .map(|doc| codec::decode_like(&doc.path, &doc.data))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn list_likes(&self, liker_id: &str) -> AffinityResult<Vec<LikeEdge>> {
        let query = CollectionQuery::collection(paths::likes_collection(liker_id))
            .order_by(FIELD_CREATED_AT, Direction::Ascending);
        let docs = self
            .backend
            .query(self.caller().as_deref(), &query)
            .await?;
        Ok(decode_valid(&docs, codec::decode_like))
    }

    #[instrument(skip(self))]
    async fn watch_likes(&self, liker_id: &str) -> AffinityResult<Subscription<Vec<LikeEdge>>> {
        let query = CollectionQuery::collection(paths::likes_collection(liker_id))
            .order_by(FIELD_CREATED_AT, Direction::Ascending);
        self.subscribe(query, codec::decode_like).await
    }
}

#[async_trait]
impl ThreadRepository for BackendSession {
    #[instrument(skip(self, draft), fields(thread_id = %draft.id))]
    async fn create_thread_if_absent(
        &self,
        draft: &ThreadDraft,
    ) -> AffinityResult<CreateOutcome<Thread>> {
        let path = codec::checked_thread_path(&draft.id)?;
        let data = with_field(
            codec::encode_thread_draft(draft)?,
            FIELD_LAST_MESSAGE_AT,
            server_timestamp(),
        );
        let outcome = self
            .backend
            .create_if_absent(self.caller().as_deref(), &path, data)
            .await?;
        Ok(match outcome {
            CreateOutcome::Created(doc) => {
                CreateOutcome::Created(codec::decode_thread(&doc.path, &doc.data)?)
            }
            CreateOutcome::Existing(doc) => {
                CreateOutcome::Existing(codec::decode_thread(&doc.path, &doc.data)?)
            }
        })
    }

    #[instrument(skip(self))]
    async fn get_thread(&self, thread_id: &str) -> AffinityResult<Option<Thread>> {
        let path = codec::checked_thread_path(thread_id)?;
        self.backend
            .get(self.caller().as_deref(), &path)
            .await?
            .map(|doc| codec::decode_thread(&doc.path, &doc.data))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn list_direct_threads(&self, user_id: &str) -> AffinityResult<Vec<Thread>> {
        let docs = self
            .backend
            .query(self.caller().as_deref(), &participants_query(user_id))
            .await?;
        Ok(decode_valid(&docs, decode_direct_thread))
    }

    #[instrument(skip(self, last_message))]
    async fn update_summary(&self, thread_id: &str, last_message: &str) -> AffinityResult<()> {
        let path = codec::checked_thread_path(thread_id)?;
        let mut fields = Map::new();
        fields.insert(
            FIELD_LAST_MESSAGE.to_string(),
            Value::String(last_message.to_string()),
        );
        fields.insert(FIELD_LAST_MESSAGE_AT.to_string(), server_timestamp());
        self.backend
            .update(self.caller().as_deref(), &path, fields)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn watch_direct_threads(
        &self,
        user_id: &str,
    ) -> AffinityResult<Subscription<Vec<Thread>>> {
        self.subscribe(participants_query(user_id), decode_direct_thread)
            .await
    }
}

#[async_trait]
impl MessageRepository for BackendSession {
    #[instrument(skip(self, draft), fields(thread_id = %draft.thread_id, sender_id = %draft.sender_id))]
    async fn append_message(&self, draft: &MessageDraft) -> AffinityResult<Message> {
        codec::checked_thread_path(&draft.thread_id)?;
        let data = with_field(
            codec::encode_message_draft(draft)?,
            FIELD_CREATED_AT,
            server_timestamp(),
        );
        let doc = self
            .backend
            .add(
                self.caller().as_deref(),
                &paths::messages_collection(&draft.thread_id),
                data,
            )
            .await?;
        codec::decode_message(&doc.path, &doc.data)
    }

    #[instrument(skip(self))]
    async fn list_messages(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> AffinityResult<Vec<Message>> {
        codec::checked_thread_path(thread_id)?;
        let mut query = CollectionQuery::collection(paths::messages_collection(thread_id))
            .order_by(FIELD_CREATED_AT, Direction::Ascending);
        if let Some(limit) = limit {
            query = query.limit_to_last(limit);
        }
        let docs = self
            .backend
            .query(self.caller().as_deref(), &query)
            .await?;
        Ok(decode_valid(&docs, codec::decode_message))
    }

    #[instrument(skip(self))]
    async fn watch_messages(&self, thread_id: &str) -> AffinityResult<Subscription<Vec<Message>>> {
        codec::checked_thread_path(thread_id)?;
        let query = CollectionQuery::collection(paths::messages_collection(thread_id))
            .order_by(FIELD_CREATED_AT, Direction::Ascending);
        self.subscribe(query, codec::decode_message).await
    }
}

#[cfg(test)]
mod tests {
    use affinity_core::ErrorKind;

    use super::*;
    use crate::domain::model::UserRole;

    fn session(backend: &Arc<InMemoryBackend>, user: &str) -> BackendSession {
        let session = BackendSession::new(backend.clone());
        session.sign_in(user);
        session
    }

    #[tokio::test]
    async fn test_profile_round_trip_through_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let u1 = session(&backend, "u1");
        let profile = UserProfile::new("u1", "Ada", UserRole::Enterprise).with_tags(["rust"]);
        u1.put_profile(&profile).await.unwrap();

        let u2 = session(&backend, "u2");
        assert_eq!(u2.get_profile("u1").await.unwrap(), Some(profile));
        assert_eq!(u2.get_profile("nobody").await.unwrap(), None);

        let err = u2.put_profile(&UserProfile::new("u1", "Mallory", UserRole::Enterprise))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_signed_out_session_is_unauthenticated() {
        let backend = Arc::new(InMemoryBackend::new());
        let device = session(&backend, "u1");
        device.sign_out();
        assert_eq!(device.current_user_id(), None);

        let err = device.upsert_like("u1", "u2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_subscription_releases_backend_listener() {
        let backend = Arc::new(InMemoryBackend::new());
        let u1 = session(&backend, "u1");

        let mut likes = u1.watch_likes("u1").await.unwrap();
        assert_eq!(backend.listener_count(), 1);
        assert_eq!(likes.next().await, Some(vec![]));

        u1.upsert_like("u1", "u2").await.unwrap();
        let snapshot = likes.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].liked_id, "u2");

        likes.unsubscribe();
        assert_eq!(backend.listener_count(), 0);
        assert_eq!(likes.next().await, None);
    }

    #[tokio::test]
    async fn test_invalid_documents_are_skipped_in_listings() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .seed_document(
                "users/u1/likes/u2",
                serde_json::json!({ "created_at": "2024-01-01T00:00:00Z" }),
            )
            .await
            .unwrap();
        backend
            .seed_document(
                "users/u1/likes/u3",
                serde_json::json!({ "schema_version": 9, "created_at": "2024-01-01T00:00:00Z" }),
            )
            .await
            .unwrap();

        let u1 = session(&backend, "u1");
        let likes = u1.list_likes("u1").await.unwrap();
        assert_eq!(likes.len(), 1);

        let err = u1.get_like("u1", "u3").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);
    }
}
