//! Store of alarm identifiers that have already produced a notification.
//!
//! Entries expire after a time-to-live so a long running relay does not
//! accumulate every alarm it has ever seen. The TTL must cover the polling
//! window: an alarm that can still be returned by the alarm source must still
//! be remembered. A store built with [`DedupStore::unbounded`] never expires.

use crate::alarm::AlarmId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Alarm identifiers already notified in this process
#[derive(Debug, Clone, Default)]
pub struct DedupStore {
    seen: HashMap<AlarmId, Instant>,
    ttl: Option<Duration>,
}

impl DedupStore {
    /// Store whose entries expire `ttl` after being recorded
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            ttl: Some(ttl),
        }
    }

    /// Store whose entries never expire
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Whether `id` was recorded and has not expired
    pub fn contains(&self, id: &AlarmId) -> bool {
        self.contains_at(id, Instant::now())
    }

    pub fn contains_at(&self, id: &AlarmId, now: Instant) -> bool {
        self.seen
            .get(id)
            .map_or(false, |recorded| !self.is_expired(*recorded, now))
    }

    /// Record `id`. Returns `false` when it was already live in the store.
    pub fn insert(&mut self, id: AlarmId) -> bool {
        self.insert_at(id, Instant::now())
    }

    pub fn insert_at(&mut self, id: AlarmId, now: Instant) -> bool {
        if self.contains_at(&id, now) {
            return false;
        }
        self.seen.insert(id, now);
        true
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let before = self.seen.len();
        self.seen
            .retain(|_, recorded| now.saturating_duration_since(*recorded) < ttl);
        let purged = before - self.seen.len();
        if purged > 0 {
            debug!("Expired {} alarm ids from dedup store", purged);
        }
        purged
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn is_expired(&self, recorded: Instant, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(recorded) >= ttl,
            None => false,
        }
    }
}
