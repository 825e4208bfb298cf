// Copyright 2026 The Nodestore Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Negative cache: remembers hashes recently confirmed absent from a
//! backend so repeated lookups for the same missing key don't repeat a
//! full backend round-trip.
//!
//! Entries are single-shot: a `store`/`store_batch` that writes a hash
//! must invalidate its negative-cache entry before the write is visible
//! to readers, per the `Database` facade's close/store ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nodestore_util::Hash256;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Point-in-time counters for `is_missing` lookups, exposed for metrics
/// and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegativeCacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct Inner {
    entries: HashMap<Hash256, Instant>,
    max_size: usize,
    stats: NegativeCacheStats,
}

/// Tracks hashes a backend has confirmed it does not hold, each with a
/// bounded time-to-live. At capacity, the oldest ~10% of entries are
/// evicted to make room rather than rejecting the new entry outright.
pub struct NegativeCache {
    inner: RwLock<Inner>,
    ttl: Duration,
    closed: AtomicBool,
    sweeper: std::sync::Mutex<Option<(JoinHandle<()>, std::sync::Arc<Notify>)>>,
}

impl NegativeCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                max_size,
                stats: NegativeCacheStats::default(),
            }),
            ttl,
            closed: AtomicBool::new(false),
            sweeper: std::sync::Mutex::new(None),
        }
    }

    /// Records `hash` as confirmed-missing as of now. If the cache is at
    /// capacity, evicts the oldest ~10% of entries (at least one) before
    /// inserting.
    pub fn mark_missing(&self, hash: Hash256) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut inner = self.inner.write();
        let max_size = inner.max_size;
        if max_size > 0 && inner.entries.len() >= max_size {
            let evict_count = (inner.entries.len() / 10).max(1);
            let mut by_age: Vec<(Hash256, Instant)> =
                inner.entries.iter().map(|(h, t)| (*h, *t)).collect();
            by_age.sort_by_key(|(_, t)| *t);
            for (hash, _) in by_age.into_iter().take(evict_count) {
                inner.entries.remove(&hash);
            }
        }
        inner.entries.insert(hash, Instant::now());
    }

    /// Returns true if `hash` is recorded as missing and that record has
    /// not yet expired, counting a hit. An expired record is lazily
    /// removed here and counts a miss, as does an absent record.
    pub fn is_missing(&self, hash: Hash256) -> bool {
        let now = Instant::now();
        {
            let mut inner = self.inner.write();
            match inner.entries.get(&hash) {
                Some(t) if self.ttl == Duration::ZERO || now.duration_since(*t) < self.ttl => {
                    inner.stats.hits += 1;
                    return true;
                }
                None => {
                    inner.stats.misses += 1;
                    return false;
                }
                Some(_) => {}
            }
        }
        let mut inner = self.inner.write();
        inner.entries.remove(&hash);
        inner.stats.misses += 1;
        false
    }

    pub fn remove(&self, hash: Hash256) {
        self.inner.write().entries.remove(&hash);
    }

    pub fn stats(&self) -> NegativeCacheStats {
        self.inner.read().stats
    }

    /// Drops every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write();
        if self.ttl == Duration::ZERO {
            return 0;
        }
        let ttl = self.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, t| now.duration_since(*t) < ttl);
        before - inner.entries.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns a background task sweeping every `interval`. Calling this
    /// a second time before `stop_sweeper` is a no-op: the sweeper is
    /// idempotent-start, matching the batch writer's worker lifecycle.
    pub fn start_sweeper(self: &std::sync::Arc<Self>, interval: Duration)
    where
        Self: 'static,
    {
        let mut guard = self.sweeper.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let stop = std::sync::Arc::new(Notify::new());
        let this = std::sync::Arc::clone(self);
        let stop_rx = std::sync::Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.sweep();
                    }
                    _ = stop_rx.notified() => break,
                }
            }
        });
        *guard = Some((handle, stop));
    }

    pub fn stop_sweeper(&self) {
        if let Some((handle, stop)) = self.sweeper.lock().unwrap().take() {
            stop.notify_one();
            handle.abort();
        }
    }

    /// Marks the cache closed: subsequent `mark_missing` calls are
    /// dropped silently, and any running sweeper is stopped. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.stop_sweeper();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn hash(tag: u8) -> Hash256 {
        Hash256::digest(&[tag; 4])
    }

    #[test]
    fn marks_and_queries_missing() {
        let cache = NegativeCache::new(Duration::ZERO, 0);
        let h = hash(1);
        assert!(!cache.is_missing(h));
        cache.mark_missing(h);
        assert!(cache.is_missing(h));
    }

    #[test]
    fn is_missing_counts_hits_and_misses() {
        let cache = NegativeCache::new(Duration::ZERO, 0);
        let h = hash(1);
        assert!(!cache.is_missing(h));
        cache.mark_missing(h);
        assert!(cache.is_missing(h));
        assert!(cache.is_missing(h));
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn remove_clears_an_entry() {
        let cache = NegativeCache::new(Duration::ZERO, 0);
        let h = hash(1);
        cache.mark_missing(h);
        cache.remove(h);
        assert!(!cache.is_missing(h));
    }

    #[test]
    fn ttl_expiry_clears_missing_state() {
        let cache = NegativeCache::new(Duration::from_millis(1), 0);
        let h = hash(1);
        cache.mark_missing(h);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!cache.is_missing(h));
    }

    #[test]
    fn eviction_at_capacity_drops_oldest_entries() {
        let cache = NegativeCache::new(Duration::ZERO, 10);
        for i in 0..10u8 {
            cache.mark_missing(hash(i));
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(cache.len(), 10);
        cache.mark_missing(hash(200));
        assert!(cache.len() <= 10);
        assert!(cache.is_missing(hash(200)));
        assert!(!cache.is_missing(hash(0)), "oldest entry should have been evicted");
    }

    #[test]
    fn closed_cache_ignores_further_marks() {
        let cache = NegativeCache::new(Duration::ZERO, 0);
        cache.close();
        cache.mark_missing(hash(1));
        assert!(!cache.is_missing(hash(1)));
    }

    #[tokio::test]
    async fn sweeper_start_is_idempotent() {
        let cache = Arc::new(NegativeCache::new(Duration::from_millis(1), 0));
        cache.start_sweeper(Duration::from_millis(1));
        cache.start_sweeper(Duration::from_millis(1));
        cache.mark_missing(hash(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.stop_sweeper();
        assert!(!cache.is_missing(hash(1)));
    }
}
