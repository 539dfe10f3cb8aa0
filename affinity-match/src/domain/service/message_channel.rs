//! 消息通道
//!
//! 追加消息后再单独更新会话摘要，两次写入不是原子的：摘要写入失败时返回错误，
//! 消息保留，下一次成功发送会修复摘要。

use std::sync::Arc;

use affinity_core::{AffinityResult, ensure_arg};
use tracing::{debug, info, instrument, warn};

use crate::domain::model::{Message, MessageDraft, MatchDomainConfig, SendOutcome};
use crate::domain::repository::{AuthSession, MessageRepository, Subscription, ThreadRepository};

pub struct MessageChannel {
    auth: Arc<dyn AuthSession>,
    message_repo: Arc<dyn MessageRepository>,
    thread_repo: Arc<dyn ThreadRepository>,
    config: MatchDomainConfig,
}

impl MessageChannel {
    pub fn new(
        auth: Arc<dyn AuthSession>,
        message_repo: Arc<dyn MessageRepository>,
        thread_repo: Arc<dyn ThreadRepository>,
        config: MatchDomainConfig,
    ) -> Self {
        Self {
            auth,
            message_repo,
            thread_repo,
            config,
        }
    }

    /// 发送文本消息
    #[instrument(skip(self, text), fields(thread_id = %thread_id, sender_id = %sender_id))]
    pub async fn send(
        &self,
        thread_id: &str,
        sender_id: &str,
        text: &str,
    ) -> AffinityResult<SendOutcome> {
        if text.trim().is_empty() {
            debug!("Blank message skipped");
            return Ok(SendOutcome::Skipped);
        }
        ensure_arg!(!thread_id.is_empty(), "thread id must not be empty");
        let chars = text.chars().count();
        ensure_arg!(
            chars <= self.config.max_message_chars,
            "message has {} characters, limit is {}",
            chars,
            self.config.max_message_chars
        );
        self.auth.require_user()?;

        let draft = MessageDraft {
            thread_id: thread_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
        };
        let message = self.message_repo.append_message(&draft).await?;

        if let Err(err) = self.thread_repo.update_summary(thread_id, text).await {
            warn!(
                message_id = %message.id,
                error = %err,
                "Message appended but thread summary update failed"
            );
            return Err(err);
        }

        info!(message_id = %message.id, "Message sent");
        Ok(SendOutcome::Sent(message))
    }

    /// 按时间升序返回最近 limit 条消息
    #[instrument(skip(self))]
    pub async fn list_messages(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> AffinityResult<Vec<Message>> {
        self.auth.require_user()?;
        self.message_repo.list_messages(thread_id, limit).await
    }

    #[instrument(skip(self))]
    pub async fn observe_messages(
        &self,
        thread_id: &str,
    ) -> AffinityResult<Subscription<Vec<Message>>> {
        self.auth.require_user()?;
        self.message_repo.watch_messages(thread_id).await
    }
}
