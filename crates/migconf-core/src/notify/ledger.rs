//! Dedup ledger: the set of alert keys already raised.
//!
//! Keys live until the link of their conference is regenerated (link
//! conditions only) or the conference is deleted (all conditions). Insertion
//! is atomic, which is what keeps a timer sweep and an on-change sweep from
//! raising the same alert twice.

use super::alert::{Condition, DedupKey};
use crate::errors::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

pub trait DedupLedger: Send + Sync {
    /// Records `key`; returns `false` when it was already present.
    fn insert_if_absent(&self, key: &DedupKey, now: DateTime<Utc>) -> CoreResult<bool>;

    fn contains(&self, key: &str) -> CoreResult<bool>;

    /// Drops a single key; returns `false` when it was not present.
    fn remove(&self, key: &str) -> CoreResult<bool>;

    /// Drops keys of `conference_id`. An empty `conditions` slice drops all.
    fn clear(&self, conference_id: &str, conditions: &[Condition]) -> CoreResult<usize>;
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    keys: Mutex<HashMap<String, DedupKey>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> CoreResult<std::sync::MutexGuard<'_, HashMap<String, DedupKey>>> {
        self.keys
            .lock()
            .map_err(|_| CoreError::Storage("dedup ledger lock poisoned".into()))
    }
}

impl DedupLedger for MemoryLedger {
    fn insert_if_absent(&self, key: &DedupKey, _now: DateTime<Utc>) -> CoreResult<bool> {
        let mut keys = self.guard()?;
        if keys.contains_key(&key.value) {
            return Ok(false);
        }
        keys.insert(key.value.clone(), key.clone());
        Ok(true)
    }

    fn contains(&self, key: &str) -> CoreResult<bool> {
        Ok(self.guard()?.contains_key(key))
    }

    fn remove(&self, key: &str) -> CoreResult<bool> {
        Ok(self.guard()?.remove(key).is_some())
    }

    fn clear(&self, conference_id: &str, conditions: &[Condition]) -> CoreResult<usize> {
        let mut keys = self.guard()?;
        let before = keys.len();
        keys.retain(|_, k| {
            let owned = k.conference_id.as_deref() == Some(conference_id);
            let matches = conditions.is_empty() || conditions.contains(&k.condition);
            !(owned && matches)
        });
        Ok(before - keys.len())
    }
}
