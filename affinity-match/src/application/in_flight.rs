//! 重复提交保护
//!
//! 同一 (liker, target) 的点赞在处理期间再次提交会被拒绝（`Busy`），
//! 票据 drop 时释放，成功或失败都一样。

use std::sync::Arc;

use affinity_core::{AffinityError, AffinityResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

type PairKey = (String, String);

#[derive(Clone, Default)]
pub struct InFlightRegistry {
    pending: Arc<DashMap<PairKey, ()>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, liker_id: &str, target_id: &str) -> AffinityResult<InFlightTicket> {
        let key = (liker_id.to_string(), target_id.to_string());
        match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => Err(AffinityError::Busy(format!(
                "like {} -> {} is already being processed",
                liker_id, target_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightTicket {
                    pending: self.pending.clone(),
                    key,
                })
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

pub struct InFlightTicket {
    pending: Arc<DashMap<PairKey, ()>>,
    key: PairKey,
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use affinity_core::ErrorKind;

    use super::*;

    #[test]
    fn test_duplicate_submission_is_busy_until_released() {
        let registry = InFlightRegistry::new();
        let ticket = registry.try_acquire("u1", "u2").unwrap();

        let err = registry.try_acquire("u1", "u2").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Busy);

        // 其他组合不受影响
        let other = registry.try_acquire("u2", "u1").unwrap();
        assert_eq!(registry.in_flight(), 2);

        drop(ticket);
        drop(other);
        assert_eq!(registry.in_flight(), 0);
        assert!(registry.try_acquire("u1", "u2").is_ok());
    }
}
