//! 点赞领域服务

use std::sync::Arc;

use affinity_core::{AffinityResult, ensure_arg};
use tracing::{debug, instrument};

use crate::domain::model::{LikeEdge, LikedSet};
use crate::domain::repository::{AuthSession, LikeRepository, Subscription};

pub struct LikeDomainService {
    auth: Arc<dyn AuthSession>,
    like_repo: Arc<dyn LikeRepository>,
}

impl LikeDomainService {
    pub fn new(auth: Arc<dyn AuthSession>, like_repo: Arc<dyn LikeRepository>) -> Self {
        Self { auth, like_repo }
    }

    /// 记录点赞（upsert，重复点赞只刷新时间戳）
    #[instrument(skip(self), fields(liker_id = %liker_id, target_id = %target_id))]
    pub async fn record_like(&self, liker_id: &str, target_id: &str) -> AffinityResult<LikeEdge> {
        ensure_arg!(
            !liker_id.is_empty() && !target_id.is_empty(),
            "user ids must not be empty"
        );
        ensure_arg!(liker_id != target_id, "user {} cannot like themselves", liker_id);
        self.auth.require_user()?;

        let edge = self.like_repo.upsert_like(liker_id, target_id).await?;
        debug!(created_at = %edge.created_at, "Like recorded");
        Ok(edge)
    }

    /// a 是否点赞过 b
    #[instrument(skip(self))]
    pub async fn has_liked(&self, user_a: &str, user_b: &str) -> AffinityResult<bool> {
        self.auth.require_user()?;
        Ok(self.like_repo.get_like(user_a, user_b).await?.is_some())
    }

    /// 当前点赞集合（一次性快照）
    #[instrument(skip(self))]
    pub async fn liked_set(&self, user_id: &str) -> AffinityResult<LikedSet> {
        self.auth.require_user()?;
        let likes = self.like_repo.list_likes(user_id).await?;
        Ok(likes.into_iter().map(|edge| edge.liked_id).collect())
    }

    /// 持续观察点赞集合，每次变化推送完整集合
    #[instrument(skip(self))]
    pub async fn observe_liked_set(&self, user_id: &str) -> AffinityResult<Subscription<LikedSet>> {
        self.auth.require_user()?;
        let subscription = self.like_repo.watch_likes(user_id).await?;
        Ok(subscription.map(|edges| edges.into_iter().map(|edge| edge.liked_id).collect()))
    }
}
