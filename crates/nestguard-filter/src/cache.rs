//! Validation Cache - Short-TTL memoization of verdicts
//!
//! Keys are SHA-256 digests over everything a verdict depends on: content,
//! user, age group, direction, rule-set version and the history bit. A rule
//! change therefore never serves a stale verdict; old entries simply stop
//! being looked up and age out.
//!
//! Entries past the TTL are misses; the periodic sweep drops entries past the
//! longer max age. Capacity eviction pops the oldest insertion from a FIFO side
//! index instead of scanning the map.
//!
//! Timestamps use [`tokio::time::Instant`] so tests can drive expiry with a
//! paused clock.

use dashmap::DashMap;
use parking_lot::Mutex;
use nestguard_core::{AgeGroup, CacheSettings, Direction, ValidationVerdict};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Hex SHA-256 cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        content: &str,
        user_id: &str,
        age_group: AgeGroup,
        direction: Direction,
        rule_set_version: u64,
        negative_history: bool,
    ) -> Self {
        let mut hasher = Sha256::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart
        for field in [content, user_id] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(age_group.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(direction.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(rule_set_version.to_le_bytes());
        hasher.update([negative_history as u8]);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct CachedVerdict {
    verdict: ValidationVerdict,
    inserted_at: Instant,
}

/// Hit/miss counters and size
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Size- and time-bounded verdict cache
pub struct ValidationCache {
    entries: DashMap<CacheKey, CachedVerdict>,
    /// Insertion order; a record is stale once its key was re-inserted or removed
    order: Mutex<VecDeque<(CacheKey, Instant)>>,
    enabled: bool,
    ttl: Duration,
    max_age: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ValidationCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            enabled: settings.enabled,
            ttl: settings.ttl(),
            max_age: settings.max_age(),
            max_entries: settings.max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fresh verdict for the key, if any
    pub fn get(&self, key: &CacheKey) -> Option<ValidationVerdict> {
        if !self.enabled {
            return None;
        }

        let fresh = self.entries.get(key).and_then(|entry| {
            (entry.inserted_at.elapsed() < self.ttl).then(|| entry.verdict.clone())
        });

        match fresh {
            Some(verdict) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(verdict)
            }
            None => {
                self.entries
                    .remove_if(key, |_, entry| entry.inserted_at.elapsed() >= self.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a verdict, evicting the oldest entries beyond capacity
    pub fn put(&self, key: CacheKey, verdict: ValidationVerdict) {
        if !self.enabled {
            return;
        }
        let inserted_at = Instant::now();
        let mut order = self.order.lock();
        self.entries.insert(
            key.clone(),
            CachedVerdict {
                verdict,
                inserted_at,
            },
        );
        order.push_back((key, inserted_at));

        while self.entries.len() > self.max_entries {
            let Some((oldest, at)) = order.pop_front() else {
                break;
            };
            self.entries.remove_if(&oldest, |_, entry| entry.inserted_at == at);
        }

        // Drop stale records left by lookups and sweeps
        if order.len() > self.max_entries * 2 {
            order.retain(|(key, at)| {
                self.entries
                    .get(key)
                    .map_or(false, |entry| entry.inserted_at == *at)
            });
        }
    }

    /// Remove entries older than the sweep max age; returns the count
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < self.max_age);
        let removed = before.saturating_sub(self.entries.len());

        let mut order = self.order.lock();
        order.retain(|(_, at)| at.elapsed() < self.max_age);
        if removed > 0 {
            debug!(removed, "swept validation cache");
        }
        removed
    }

    pub fn clear(&self) {
        let mut order = self.order.lock();
        self.entries.clear();
        order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}
