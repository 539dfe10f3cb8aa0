use std::sync::Arc;

use affinity_core::{AffinityResult, RetryPolicy, retry_transient};
use tracing::{debug, info};

use crate::application::commands::{
    CreateProfileCommand, LikeUserCommand, ReconcileMatchesCommand, SendMessageCommand,
    StartChatCommand, UpdateProfileCommand,
};
use crate::application::in_flight::InFlightRegistry;
use crate::application::queries::{
    DiscoverQuery, FindDirectThreadQuery, GetProfileQuery, HasLikedQuery, LikedSetQuery,
    ListMatchesQuery, ListMessagesQuery, ListThreadsQuery,
};
use crate::domain::model::{
    DiscoverCandidate, LikedSet, MatchOutcome, Message, SendOutcome, Thread, ThreadHandle,
    UserProfile,
};
use crate::domain::repository::Subscription;
use crate::domain::service::{
    LikeDomainService, MatchDetector, MessageChannel, ProfileDomainService, ThreadRegistry,
};

/// 匹配命令处理器
pub struct MatchCommandHandler {
    detector: Arc<MatchDetector>,
    threads: Arc<ThreadRegistry>,
    channel: Arc<MessageChannel>,
    profiles: Arc<ProfileDomainService>,
    in_flight: InFlightRegistry,
    retry: RetryPolicy,
}

impl MatchCommandHandler {
    pub fn new(
        detector: Arc<MatchDetector>,
        threads: Arc<ThreadRegistry>,
        channel: Arc<MessageChannel>,
        profiles: Arc<ProfileDomainService>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            detector,
            threads,
            channel,
            profiles,
            in_flight: InFlightRegistry::new(),
            retry,
        }
    }

    /// 处理点赞命令
    pub async fn handle_like(&self, command: LikeUserCommand) -> AffinityResult<MatchOutcome> {
        debug!(
            liker_id = %command.liker_id,
            target_id = %command.target_id,
            "Handling like command"
        );

        let _ticket = self
            .in_flight
            .try_acquire(&command.liker_id, &command.target_id)?;
        let outcome = self
            .detector
            .like_and_match(&command.liker_id, &command.target_id)
            .await?;

        info!(
            liker_id = %command.liker_id,
            target_id = %command.target_id,
            matched = outcome.thread_id().is_some(),
            "Like handled"
        );
        Ok(outcome)
    }

    /// 处理发起单聊命令
    pub async fn handle_start_chat(&self, command: StartChatCommand) -> AffinityResult<ThreadHandle> {
        debug!(
            user_id = %command.user_id,
            other_user_id = %command.other_user_id,
            "Handling start chat command"
        );

        retry_transient(&self.retry, "ensure_direct_thread", || {
            self.threads
                .ensure_direct_thread(&command.user_id, &command.other_user_id)
        })
        .await
    }

    /// 处理发送消息命令（不自动重试）
    pub async fn handle_send_message(
        &self,
        command: SendMessageCommand,
    ) -> AffinityResult<SendOutcome> {
        debug!(
            thread_id = %command.thread_id,
            sender_id = %command.sender_id,
            "Handling send message command"
        );

        self.channel
            .send(&command.thread_id, &command.sender_id, &command.text)
            .await
    }

    /// 处理补齐匹配命令
    pub async fn handle_reconcile_matches(
        &self,
        command: ReconcileMatchesCommand,
    ) -> AffinityResult<Vec<String>> {
        debug!(user_id = %command.user_id, "Handling reconcile matches command");
        self.detector.reconcile_matches(&command.user_id).await
    }

    /// 处理创建资料命令
    pub async fn handle_create_profile(
        &self,
        command: CreateProfileCommand,
    ) -> AffinityResult<UserProfile> {
        debug!(user_id = %command.profile.id, "Handling create profile command");
        self.profiles.create_profile(command.profile).await
    }

    /// 处理编辑资料命令
    pub async fn handle_update_profile(
        &self,
        command: UpdateProfileCommand,
    ) -> AffinityResult<UserProfile> {
        debug!(user_id = %command.profile.id, "Handling update profile command");
        self.profiles.update_profile(command.profile).await
    }
}

/// 匹配查询处理器，读操作遇到瞬时故障会重试
pub struct MatchQueryHandler {
    likes: Arc<LikeDomainService>,
    threads: Arc<ThreadRegistry>,
    channel: Arc<MessageChannel>,
    profiles: Arc<ProfileDomainService>,
    retry: RetryPolicy,
}

impl MatchQueryHandler {
    pub fn new(
        likes: Arc<LikeDomainService>,
        threads: Arc<ThreadRegistry>,
        channel: Arc<MessageChannel>,
        profiles: Arc<ProfileDomainService>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            likes,
            threads,
            channel,
            profiles,
            retry,
        }
    }

    pub async fn handle_has_liked(&self, query: HasLikedQuery) -> AffinityResult<bool> {
        retry_transient(&self.retry, "has_liked", || {
            self.likes.has_liked(&query.liker_id, &query.target_id)
        })
        .await
    }

    pub async fn handle_liked_set(&self, query: LikedSetQuery) -> AffinityResult<LikedSet> {
        retry_transient(&self.retry, "liked_set", || {
            self.likes.liked_set(&query.user_id)
        })
        .await
    }

    pub async fn handle_observe_liked_set(
        &self,
        query: LikedSetQuery,
    ) -> AffinityResult<Subscription<LikedSet>> {
        self.likes.observe_liked_set(&query.user_id).await
    }

    pub async fn handle_get_profile(
        &self,
        query: GetProfileQuery,
    ) -> AffinityResult<Option<UserProfile>> {
        retry_transient(&self.retry, "get_profile", || {
            self.profiles.get_profile(&query.user_id)
        })
        .await
    }

    pub async fn handle_discover(
        &self,
        query: DiscoverQuery,
    ) -> AffinityResult<Vec<DiscoverCandidate>> {
        retry_transient(&self.retry, "discover", || {
            self.profiles
                .discover(&query.user_id, query.limit, query.role)
        })
        .await
    }

    pub async fn handle_list_matches(&self, query: ListMatchesQuery) -> AffinityResult<Vec<String>> {
        retry_transient(&self.retry, "list_matches", || {
            self.profiles.list_matches(&query.user_id)
        })
        .await
    }

    pub async fn handle_list_threads(&self, query: ListThreadsQuery) -> AffinityResult<Vec<Thread>> {
        retry_transient(&self.retry, "list_direct_threads", || {
            self.threads.list_direct_threads(&query.user_id)
        })
        .await
    }

    pub async fn handle_observe_threads(
        &self,
        query: ListThreadsQuery,
    ) -> AffinityResult<Subscription<Vec<Thread>>> {
        self.threads.observe_direct_threads(&query.user_id).await
    }

    pub async fn handle_find_direct_thread(
        &self,
        query: FindDirectThreadQuery,
    ) -> AffinityResult<Option<Thread>> {
        retry_transient(&self.retry, "find_direct_thread", || {
            self.threads
                .find_direct_thread(&query.user_id, &query.other_user_id)
        })
        .await
    }

    pub async fn handle_list_messages(
        &self,
        query: ListMessagesQuery,
    ) -> AffinityResult<Vec<Message>> {
        retry_transient(&self.retry, "list_messages", || {
            self.channel.list_messages(&query.thread_id, query.limit)
        })
        .await
    }

    pub async fn handle_observe_messages(
        &self,
        query: ListMessagesQuery,
    ) -> AffinityResult<Subscription<Vec<Message>>> {
        self.channel.observe_messages(&query.thread_id).await
    }
}
