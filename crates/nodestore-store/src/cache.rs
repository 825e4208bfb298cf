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

//! In-process LRU+TTL positive cache sitting in front of a `Backend`.
//!
//! Recency is tracked with an intrusive doubly-linked list threaded through
//! a slab (`Vec<Slot>`), keyed here by `Hash256`. A `HashMap<Hash256, usize>`
//! maps a hash to its slot index for O(1) lookup.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nodestore_util::{Hash256, Node};
use parking_lot::Mutex;

const NONE: usize = usize::MAX;

struct Slot {
    hash: Hash256,
    node: Node,
    inserted_at: Instant,
    prev: usize,
    next: usize,
}

/// Point-in-time counters for cache effectiveness, exposed for metrics
/// and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct Inner {
    slots: Vec<Slot>,
    index: HashMap<Hash256, usize>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    total_bytes: usize,
    max_items: usize,
    ttl: Duration,
    stats: CacheStats,
}

impl Inner {
    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev != NONE {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NONE {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = NONE;
        self.slots[idx].next = self.head;
        if self.head != NONE {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NONE {
            self.tail = idx;
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn remove_slot(&mut self, idx: usize) {
        self.detach(idx);
        let slot = &self.slots[idx];
        self.total_bytes = self.total_bytes.saturating_sub(slot.node.data.len());
        self.index.remove(&slot.hash);
        self.free.push(idx);
    }

    fn evict_tail(&mut self) {
        if self.tail != NONE {
            let idx = self.tail;
            self.remove_slot(idx);
            self.stats.evictions += 1;
        }
    }

    fn is_expired(&self, idx: usize, now: Instant) -> bool {
        self.ttl > Duration::ZERO && now.duration_since(self.slots[idx].inserted_at) >= self.ttl
    }
}

/// Thread-safe LRU-with-TTL cache of `Node`s keyed by `Hash256`.
///
/// `max_items == 0` means unbounded (no eviction by count); `ttl ==
/// Duration::ZERO` means entries never expire by age. Eviction on
/// insertion always proceeds from the least-recently-used end first.
pub struct Cache {
    inner: Mutex<Inner>,
}

impl Cache {
    pub fn new(max_items: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                index: HashMap::new(),
                free: Vec::new(),
                head: NONE,
                tail: NONE,
                total_bytes: 0,
                max_items,
                ttl,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Looks up `hash`, promoting it to most-recently-used on a hit.
    /// An entry found to be past its TTL is evicted and treated as a
    /// miss rather than being returned stale.
    pub fn get(&self, hash: Hash256) -> Option<Node> {
        let mut inner = self.inner.lock();
        let Some(&idx) = inner.index.get(&hash) else {
            inner.stats.misses += 1;
            return None;
        };
        let now = Instant::now();
        if inner.is_expired(idx, now) {
            inner.remove_slot(idx);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return None;
        }
        inner.touch(idx);
        inner.stats.hits += 1;
        Some(inner.slots[idx].node.clone())
    }

    /// Inserts or refreshes `node` under its own hash, evicting
    /// least-recently-used entries until the item-count budget is met.
    pub fn put(&self, node: Node) {
        let mut inner = self.inner.lock();
        let hash = node.hash;
        if let Some(&idx) = inner.index.get(&hash) {
            inner.total_bytes = inner.total_bytes.saturating_sub(inner.slots[idx].node.data.len());
            inner.total_bytes += node.data.len();
            inner.slots[idx].node = node;
            inner.slots[idx].inserted_at = Instant::now();
            inner.touch(idx);
            return;
        }

        let idx = if let Some(idx) = inner.free.pop() {
            inner.slots[idx] = Slot {
                hash,
                node: node.clone(),
                inserted_at: Instant::now(),
                prev: NONE,
                next: NONE,
            };
            idx
        } else {
            inner.slots.push(Slot {
                hash,
                node: node.clone(),
                inserted_at: Instant::now(),
                prev: NONE,
                next: NONE,
            });
            inner.slots.len() - 1
        };
        inner.total_bytes += node.data.len();
        inner.index.insert(hash, idx);
        inner.push_front(idx);

        let max_items = inner.max_items;
        if max_items > 0 {
            while inner.index.len() > max_items {
                inner.evict_tail();
            }
        }
    }

    pub fn remove(&self, hash: Hash256) {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.index.get(&hash) {
            inner.remove_slot(idx);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.index.clear();
        inner.free.clear();
        inner.head = NONE;
        inner.tail = NONE;
        inner.total_bytes = 0;
    }

    /// Walks from the LRU end evicting any entry past its TTL. Returns
    /// the number of entries removed. Intended to be called periodically
    /// by a background sweeper rather than relying solely on lazy
    /// expiration in `get`.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.ttl == Duration::ZERO {
            return 0;
        }
        let now = Instant::now();
        let mut removed = 0;
        let mut idx = inner.tail;
        while idx != NONE {
            let prev = inner.slots[idx].prev;
            if inner.is_expired(idx, now) {
                inner.remove_slot(idx);
                inner.stats.expirations += 1;
                removed += 1;
            }
            idx = prev;
        }
        removed
    }

    /// Changes the TTL applied to future insertions and future expiry
    /// checks. Entries already stored keep their original insertion
    /// timestamp, so a TTL shortened after the fact takes effect
    /// immediately via `is_expired`, while a TTL lengthened after the
    /// fact only benefits entries inserted from this point on in terms
    /// of how stale they're allowed to get relative to the new value.
    pub fn set_ttl(&self, ttl: Duration) {
        self.inner.lock().ttl = ttl;
    }

    pub fn set_max_size(&self, max_items: usize) {
        let mut inner = self.inner.lock();
        inner.max_items = max_items;
        if max_items > 0 {
            while inner.index.len() > max_items {
                inner.evict_tail();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodestore_util::NodeType;
    use pretty_assertions::assert_eq;

    fn node(tag: u8) -> Node {
        Node::new(NodeType::Transaction, bytes::Bytes::from(vec![tag; 16]), 1, 1)
    }

    #[test]
    fn put_then_get_hits() {
        let cache = Cache::new(0, Duration::ZERO);
        let n = node(1);
        let hash = n.hash;
        cache.put(n.clone());
        assert_eq!(cache.get(hash), Some(n));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn missing_key_is_a_miss() {
        let cache = Cache::new(0, Duration::ZERO);
        let n = node(1);
        assert_eq!(cache.get(n.hash), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn lru_eviction_order_respects_recency() {
        let cache = Cache::new(2, Duration::ZERO);
        let a = node(1);
        let b = node(2);
        let c = node(3);
        cache.put(a.clone());
        cache.put(b.clone());
        // Touch `a` so `b` becomes the least-recently-used entry.
        assert_eq!(cache.get(a.hash), Some(a.clone()));
        cache.put(c.clone());
        assert_eq!(cache.get(b.hash), None, "b should have been evicted");
        assert_eq!(cache.get(a.hash), Some(a));
        assert_eq!(cache.get(c.hash), Some(c));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn ttl_expiry_treated_as_miss() {
        let cache = Cache::new(0, Duration::from_millis(1));
        let n = node(1);
        let hash = n.hash;
        cache.put(n);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(hash), None);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn sweep_removes_expired_entries_without_a_get() {
        let cache = Cache::new(0, Duration::from_millis(1));
        cache.put(node(1));
        cache.put(node(2));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn set_max_size_evicts_down_immediately() {
        let cache = Cache::new(0, Duration::ZERO);
        cache.put(node(1));
        cache.put(node(2));
        cache.put(node(3));
        cache.set_max_size(1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = Cache::new(0, Duration::ZERO);
        cache.put(node(1));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
