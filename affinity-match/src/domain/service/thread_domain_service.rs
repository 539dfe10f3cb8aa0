//! 单聊会话注册表
//!
//! 会话 ID 即规范的用户对键（`direct_pair_key`），find-or-create 是一次原子条件写入，
//! 两端并发创建时只会得到同一个会话。旧版本客户端以随机 ID 创建的会话仍可能存在，
//! 会话列表按用户对折叠，只保留最近更新的一条。

use std::collections::HashMap;
use std::sync::Arc;

use affinity_core::{AffinityResult, direct_pair_key, ensure_arg, parse_direct_pair_key};
use tracing::{debug, info, instrument};

use crate::domain::model::{MatchDomainConfig, Thread, ThreadDraft, ThreadHandle};
use crate::domain::repository::{ProfileRepository, Subscription, ThreadRepository};

pub struct ThreadRegistry {
    thread_repo: Arc<dyn ThreadRepository>,
    profile_repo: Arc<dyn ProfileRepository>,
    config: MatchDomainConfig,
}

impl ThreadRegistry {
    pub fn new(
        thread_repo: Arc<dyn ThreadRepository>,
        profile_repo: Arc<dyn ProfileRepository>,
        config: MatchDomainConfig,
    ) -> Self {
        Self {
            thread_repo,
            profile_repo,
            config,
        }
    }

    /// 获取或创建 {a, b} 的单聊，返回会话 ID
    ///
    /// 已有规范会话或旧版会话时直接复用，只有新建时才读取头像缓存。
    /// `user_a` 须为当前登录用户。
    #[instrument(skip(self), fields(user_a = %user_a, user_b = %user_b))]
    pub async fn ensure_direct_thread(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> AffinityResult<ThreadHandle> {
        ensure_arg!(
            !user_a.is_empty() && !user_b.is_empty(),
            "user ids must not be empty"
        );
        ensure_arg!(
            user_a != user_b,
            "cannot open a direct thread between {} and themselves",
            user_a
        );

        if let Some(thread) = self.find_direct_thread(user_a, user_b).await? {
            debug!(thread_id = %thread.id, "Direct thread already exists");
            return Ok(ThreadHandle {
                thread_id: thread.id,
                created: false,
            });
        }

        let mut participants = vec![user_a.to_string(), user_b.to_string()];
        participants.sort();
        let draft = ThreadDraft {
            id: direct_pair_key(user_a, user_b),
            participant_photos: self.photo_cache(&participants).await,
            participants,
        };

        // 并发创建时条件写入只有一方成功
        let outcome = self.thread_repo.create_thread_if_absent(&draft).await?;
        let created = outcome.was_created();
        let thread = outcome.into_inner();
        if created {
            info!(thread_id = %thread.id, "Direct thread created");
        } else {
            debug!(thread_id = %thread.id, "Direct thread created concurrently");
        }

        Ok(ThreadHandle {
            thread_id: thread.id,
            created,
        })
    }

    /// 查找 {a, b} 的单聊：优先规范 ID，其次最近更新的旧版会话
    ///
    /// `user_a` 须为当前登录用户。
    #[instrument(skip(self))]
    pub async fn find_direct_thread(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> AffinityResult<Option<Thread>> {
        ensure_arg!(user_a != user_b, "a direct thread needs two distinct users");

        let canonical_id = direct_pair_key(user_a, user_b);
        if let Some(thread) = self.thread_repo.get_thread(&canonical_id).await? {
            return Ok(Some(thread));
        }
        if !self.config.dedupe_legacy_threads {
            return Ok(None);
        }

        let legacy = self
            .thread_repo
            .list_direct_threads(user_a)
            .await?
            .into_iter()
            .filter(|thread| thread.is_direct_between(user_a, user_b))
            .max_by(|x, y| {
                x.last_message_at
                    .cmp(&y.last_message_at)
                    .then_with(|| y.id.cmp(&x.id))
            });
        if let Some(thread) = &legacy {
            debug!(thread_id = %thread.id, "Resolved legacy direct thread");
        }
        Ok(legacy)
    }

    pub async fn get_thread(&self, thread_id: &str) -> AffinityResult<Option<Thread>> {
        self.thread_repo.get_thread(thread_id).await
    }

    /// 会话列表，按 last_message_at 倒序
    #[instrument(skip(self))]
    pub async fn list_direct_threads(&self, user_id: &str) -> AffinityResult<Vec<Thread>> {
        let threads = self.thread_repo.list_direct_threads(user_id).await?;
        Ok(self.arrange(threads))
    }

    /// 持续观察会话列表
    #[instrument(skip(self))]
    pub async fn observe_direct_threads(
        &self,
        user_id: &str,
    ) -> AffinityResult<Subscription<Vec<Thread>>> {
        let dedupe = self.config.dedupe_legacy_threads;
        let subscription = self.thread_repo.watch_direct_threads(user_id).await?;
        Ok(subscription.map(move |threads| {
            if dedupe {
                collapse_duplicate_pairs(threads)
            } else {
                sort_by_recency(threads)
            }
        }))
    }

    fn arrange(&self, threads: Vec<Thread>) -> Vec<Thread> {
        if self.config.dedupe_legacy_threads {
            collapse_duplicate_pairs(threads)
        } else {
            sort_by_recency(threads)
        }
    }

    /// 参与者头像缓存，读取失败或未设置头像的参与者不写入
    async fn photo_cache(&self, participants: &[String]) -> HashMap<String, String> {
        let mut photos = HashMap::new();
        for user_id in participants {
            match self.profile_repo.get_profile(user_id).await {
                Ok(Some(profile)) => {
                    if let Some(url) = profile.photo_url {
                        photos.insert(user_id.clone(), url);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(user_id = %user_id, error = %err, "Profile unavailable for photo cache");
                }
            }
        }
        photos
    }
}

fn sort_by_recency(mut threads: Vec<Thread>) -> Vec<Thread> {
    threads.sort_by(|x, y| {
        y.last_message_at
            .cmp(&x.last_message_at)
            .then_with(|| x.id.cmp(&y.id))
    });
    threads
}

/// 同一用户对只保留最近更新的会话；时间相同时优先规范 ID
pub fn collapse_duplicate_pairs(threads: Vec<Thread>) -> Vec<Thread> {
    let mut latest: HashMap<(String, String), Thread> = HashMap::new();
    let mut passthrough = Vec::new();

    for thread in threads {
        let Some((a, b)) = thread.pair() else {
            passthrough.push(thread);
            continue;
        };
        let key = (a.to_string(), b.to_string());
        let replace = latest
            .get(&key)
            .is_none_or(|kept| supersedes(&thread, kept));
        if replace {
            latest.insert(key, thread);
        }
    }

    passthrough.extend(latest.into_values());
    sort_by_recency(passthrough)
}

fn supersedes(candidate: &Thread, kept: &Thread) -> bool {
    let canonical = |t: &Thread| {
        parse_direct_pair_key(&t.id)
            .is_some_and(|(a, b)| t.pair() == Some((a.as_str(), b.as_str())))
    };
    (candidate.last_message_at, canonical(candidate)) > (kept.last_message_at, canonical(kept))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn thread(id: &str, a: &str, b: &str, secs: i64) -> Thread {
        Thread {
            id: id.to_string(),
            participants: vec![a.to_string(), b.to_string()],
            is_group: false,
            last_message: String::new(),
            last_message_at: Utc.timestamp_opt(secs, 0).unwrap(),
            participant_photos: HashMap::new(),
        }
    }

    #[test]
    fn test_collapse_keeps_most_recent_per_pair() {
        let threads = vec![
            thread("legacy-1", "u1", "u2", 10),
            thread("u1_u2", "u2", "u1", 30),
            thread("legacy-2", "u2", "u1", 20),
            thread("u1_u3", "u1", "u3", 25),
        ];
        let collapsed = collapse_duplicate_pairs(threads);
        let ids: Vec<_> = collapsed.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["u1_u2", "u1_u3"]);
    }

    #[test]
    fn test_collapse_prefers_canonical_on_tie() {
        let threads = vec![
            thread("zzz-legacy", "u1", "u2", 10),
            thread("u1_u2", "u1", "u2", 10),
        ];
        let collapsed = collapse_duplicate_pairs(threads);
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].id, "u1_u2");
    }

    #[test]
    fn test_legacy_thread_can_win_when_newer() {
        let threads = vec![
            thread("u1_u2", "u1", "u2", 10),
            thread("legacy", "u1", "u2", 40),
        ];
        let collapsed = collapse_duplicate_pairs(threads);
        assert_eq!(collapsed[0].id, "legacy");
    }
}
