//! 互相点赞检测
//!
//! 点赞写入成功后检查反向点赞，存在则确保两人之间的单聊。
//! 点赞一旦写入不会回滚；之后的检查或建会话失败只记录日志并以
//! `MatchOutcome::LikeRecordedCheckFailed` 返回，可在下次启动时通过
//! `reconcile_matches` 补齐。

use std::sync::Arc;

use affinity_core::{AffinityResult, RetryPolicy, retry_transient};
use tracing::{info, instrument, warn};

use super::like_domain_service::LikeDomainService;
use super::thread_domain_service::ThreadRegistry;
use crate::domain::model::{MatchOutcome, ThreadHandle};

pub struct MatchDetector {
    likes: Arc<LikeDomainService>,
    threads: Arc<ThreadRegistry>,
    retry: RetryPolicy,
}

impl MatchDetector {
    pub fn new(
        likes: Arc<LikeDomainService>,
        threads: Arc<ThreadRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            likes,
            threads,
            retry,
        }
    }

    /// 点赞并检测是否互相匹配
    ///
    /// 点赞本身失败时返回错误；点赞成功后的任何失败都体现在返回的结果里。
    #[instrument(skip(self), fields(me = %me, target = %target))]
    pub async fn like_and_match(&self, me: &str, target: &str) -> AffinityResult<MatchOutcome> {
        retry_transient(&self.retry, "record_like", || {
            self.likes.record_like(me, target)
        })
        .await?;

        match self.promote_if_mutual(me, target).await {
            Ok(Some(handle)) => {
                info!(
                    thread_id = %handle.thread_id,
                    created = handle.created,
                    "Mutual like matched"
                );
                Ok(MatchOutcome::Matched(handle))
            }
            Ok(None) => Ok(MatchOutcome::Pending),
            Err(err) => {
                warn!(error = %err, "Like recorded but mutual check failed");
                Ok(MatchOutcome::LikeRecordedCheckFailed(err))
            }
        }
    }

    /// 若对方也点赞了我，确保单聊存在
    #[instrument(skip(self))]
    pub async fn promote_if_mutual(
        &self,
        me: &str,
        target: &str,
    ) -> AffinityResult<Option<ThreadHandle>> {
        let reverse = retry_transient(&self.retry, "has_liked", || {
            self.likes.has_liked(target, me)
        })
        .await?;
        if !reverse {
            return Ok(None);
        }

        let handle = retry_transient(&self.retry, "ensure_direct_thread", || {
            self.threads.ensure_direct_thread(me, target)
        })
        .await?;
        Ok(Some(handle))
    }

    /// 根据已存储的点赞关系补齐所有匹配会话，返回匹配的会话 ID
    ///
    /// 单个目标失败只记录日志；只有读取点赞集合失败时整体失败。
    #[instrument(skip(self))]
    pub async fn reconcile_matches(&self, me: &str) -> AffinityResult<Vec<String>> {
        let liked = retry_transient(&self.retry, "liked_set", || self.likes.liked_set(me)).await?;

        let mut thread_ids = Vec::new();
        for target in &liked {
            match self.promote_if_mutual(me, target).await {
                Ok(Some(handle)) => thread_ids.push(handle.thread_id),
                Ok(None) => {}
                Err(err) => {
                    warn!(target = %target, error = %err, "Skipping match reconciliation");
                }
            }
        }

        info!(
            liked = liked.len(),
            matched = thread_ids.len(),
            "Matches reconciled"
        );
        Ok(thread_ids)
    }
}
