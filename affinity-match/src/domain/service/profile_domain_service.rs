//! 用户资料与发现页

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use affinity_core::{AffinityError, AffinityResult, ensure_arg};
use tracing::{debug, info, instrument};

use crate::domain::model::{
    DiscoverCandidate, LikedSet, MatchDomainConfig, UserProfile, UserRole, normalize_tags,
};
use crate::domain::repository::{AuthSession, LikeRepository, ProfileRepository};

pub struct ProfileDomainService {
    auth: Arc<dyn AuthSession>,
    profile_repo: Arc<dyn ProfileRepository>,
    like_repo: Arc<dyn LikeRepository>,
    config: MatchDomainConfig,
}

impl ProfileDomainService {
    pub fn new(
        auth: Arc<dyn AuthSession>,
        profile_repo: Arc<dyn ProfileRepository>,
        like_repo: Arc<dyn LikeRepository>,
        config: MatchDomainConfig,
    ) -> Self {
        Self {
            auth,
            profile_repo,
            like_repo,
            config,
        }
    }

    /// 注册后创建资料，已存在返回 `AlreadyExists`
    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    pub async fn create_profile(&self, profile: UserProfile) -> AffinityResult<UserProfile> {
        let profile = self.prepare(profile)?;
        if self.profile_repo.get_profile(&profile.id).await?.is_some() {
            return Err(AffinityError::AlreadyExists(format!(
                "profile {}",
                profile.id
            )));
        }
        self.profile_repo.put_profile(&profile).await?;
        info!(role = %profile.role.as_str(), "Profile created");
        Ok(profile)
    }

    /// 编辑资料，不存在返回 `NotFound`
    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    pub async fn update_profile(&self, profile: UserProfile) -> AffinityResult<UserProfile> {
        let profile = self.prepare(profile)?;
        if self.profile_repo.get_profile(&profile.id).await?.is_none() {
            return Err(AffinityError::NotFound(format!("profile {}", profile.id)));
        }
        self.profile_repo.put_profile(&profile).await?;
        debug!(tags = profile.tags.len(), "Profile updated");
        Ok(profile)
    }

    pub async fn get_profile(&self, user_id: &str) -> AffinityResult<Option<UserProfile>> {
        self.auth.require_user()?;
        self.profile_repo.get_profile(user_id).await
    }

    /// 发现页：按标签 Jaccard 相似度排序，排除自己和已点赞的用户
    #[instrument(skip(self))]
    pub async fn discover(
        &self,
        me: &str,
        limit: Option<usize>,
        role: Option<UserRole>,
    ) -> AffinityResult<Vec<DiscoverCandidate>> {
        self.auth.require_user()?;
        let my_tags = self
            .profile_repo
            .get_profile(me)
            .await?
            .map(|profile| profile.tags)
            .unwrap_or_default();
        let liked: LikedSet = self
            .like_repo
            .list_likes(me)
            .await?
            .into_iter()
            .map(|edge| edge.liked_id)
            .collect();

        let mut candidates: Vec<DiscoverCandidate> = self
            .profile_repo
            .list_profiles()
            .await?
            .into_iter()
            .filter(|profile| profile.id != me && !liked.contains(&profile.id))
            .filter(|profile| role.is_none_or(|r| profile.role == r))
            .map(|profile| DiscoverCandidate {
                score: jaccard(&my_tags, &profile.tags),
                profile,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.profile.id.cmp(&b.profile.id))
        });
        candidates.truncate(limit.unwrap_or(self.config.discover_limit));
        Ok(candidates)
    }

    /// 与我互相点赞的用户
    #[instrument(skip(self))]
    pub async fn list_matches(&self, me: &str) -> AffinityResult<Vec<String>> {
        self.auth.require_user()?;
        let mut matches = Vec::new();
        for edge in self.like_repo.list_likes(me).await? {
            if self.like_repo.get_like(&edge.liked_id, me).await?.is_some() {
                matches.push(edge.liked_id);
            }
        }
        matches.sort();
        Ok(matches)
    }

    fn prepare(&self, mut profile: UserProfile) -> AffinityResult<UserProfile> {
        let caller = self.auth.require_user()?;
        if caller != profile.id {
            return Err(AffinityError::PermissionDenied(format!(
                "{} may not edit profile {}",
                caller, profile.id
            )));
        }
        ensure_arg!(
            !profile.display_name.trim().is_empty(),
            "display name must not be empty"
        );
        profile.display_name = profile.display_name.trim().to_string();
        profile.tags = normalize_tags(&profile.tags);
        Ok(profile)
    }
}

/// 标签集合的 Jaccard 相似度，两边都为空时为 0
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jaccard() {
        let a = normalize_tags(["rust", "music", "design"]);
        let b = normalize_tags(["Rust", "design", "travel"]);
        assert!((jaccard(&a, &b) - 0.5).abs() < f64::EPSILON);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
        assert_eq!(jaccard(&a, &a), 1.0);
    }
}
