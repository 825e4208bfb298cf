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

//! `RotatingDatabase`: a hot primary backend plus an age-ordered chain of
//! cold backends, rotated on demand rather than on a fixed schedule.
//!
//! Reads check the primary first, then walk the cold chain from newest
//! to oldest. Writes always go to the primary. `rotate()` demotes the
//! current primary to the front of the cold chain and installs a fresh
//! one in its place; `dispose_expired` drops (and deletes) cold backends
//! past their retention period.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nodestore_error::Error;
use nodestore_util::{Hash256, Node};
use parking_lot::RwLock;

use crate::backend::Backend;

struct ColdEntry {
    backend: Arc<dyn Backend>,
    rotated_at: Instant,
}

struct State {
    primary: Arc<dyn Backend>,
    cold: Vec<ColdEntry>,
}

/// Hot/cold backend chain with explicit rotation, used to bound how much
/// data a single backend instance accumulates before it's sealed and
/// replaced.
pub struct RotatingDatabase {
    state: RwLock<State>,
    rotation_threshold: u64,
    retention_period: Duration,
    next_primary: Box<dyn Fn() -> Arc<dyn Backend> + Send + Sync>,
}

impl RotatingDatabase {
    pub fn new(
        primary: Arc<dyn Backend>,
        rotation_threshold: u64,
        retention_period: Duration,
        next_primary: Box<dyn Fn() -> Arc<dyn Backend> + Send + Sync>,
    ) -> Self {
        Self {
            state: RwLock::new(State { primary, cold: Vec::new() }),
            rotation_threshold,
            retention_period,
            next_primary,
        }
    }

    pub async fn fetch(&self, hash: Hash256) -> Result<Option<Node>, Error> {
        let (primary, cold_backends) = {
            let state = self.state.read();
            (
                Arc::clone(&state.primary),
                state.cold.iter().map(|e| Arc::clone(&e.backend)).collect::<Vec<_>>(),
            )
        };
        if let Some(node) = primary.fetch(hash).await? {
            return Ok(Some(node));
        }
        for backend in cold_backends {
            if let Some(node) = backend.fetch(hash).await? {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    pub async fn fetch_batch(&self, hashes: &[Hash256]) -> Result<Vec<Option<Node>>, Error> {
        let mut results = vec![None; hashes.len()];
        let remaining: Vec<usize> = (0..hashes.len()).collect();
        self.fetch_batch_into(hashes, &mut results, remaining).await?;
        Ok(results)
    }

    async fn fetch_batch_into(
        &self,
        hashes: &[Hash256],
        results: &mut [Option<Node>],
        mut remaining: Vec<usize>,
    ) -> Result<(), Error> {
        let (primary, cold_backends) = {
            let state = self.state.read();
            (
                Arc::clone(&state.primary),
                state.cold.iter().map(|e| Arc::clone(&e.backend)).collect::<Vec<_>>(),
            )
        };

        let mut backends = vec![primary];
        backends.extend(cold_backends);

        for backend in backends {
            if remaining.is_empty() {
                break;
            }
            let query: Vec<Hash256> = remaining.iter().map(|&i| hashes[i]).collect();
            let found = backend.fetch_batch(&query).await?;
            let mut still_missing = Vec::new();
            for (pos, idx) in remaining.into_iter().enumerate() {
                match found[pos].clone() {
                    Some(node) => results[idx] = Some(node),
                    None => still_missing.push(idx),
                }
            }
            remaining = still_missing;
        }
        Ok(())
    }

    pub async fn store(&self, node: Node) -> Result<(), Error> {
        let primary = Arc::clone(&self.state.read().primary);
        primary.store(node).await
    }

    pub async fn store_batch(&self, nodes: Vec<Node>) -> Result<(), Error> {
        let primary = Arc::clone(&self.state.read().primary);
        primary.store_batch(nodes).await
    }

    fn should_rotate_backend(&self, backend: &Arc<dyn Backend>) -> bool {
        self.rotation_threshold > 0 && backend.get_write_load() >= self.rotation_threshold
    }

    /// Advisory only: reports whether the primary has crossed the
    /// rotation threshold. The caller decides whether and when to act
    /// on this by calling `rotate()` — nothing here rotates on its own.
    pub fn should_rotate(&self) -> bool {
        self.should_rotate_backend(&self.state.read().primary)
    }

    /// Syncs the current primary, demotes it to the head of the cold
    /// chain, installs a freshly constructed backend as the new
    /// primary, and disposes any cold backend past `retention_period`.
    pub async fn rotate(&self) -> Result<(), Error> {
        let primary = Arc::clone(&self.state.read().primary);
        primary.sync().await?;

        let fresh = (self.next_primary)();
        fresh.open(true).await?;

        {
            let mut state = self.state.write();
            let old_primary = std::mem::replace(&mut state.primary, fresh);
            state.cold.insert(
                0,
                ColdEntry {
                    backend: old_primary,
                    rotated_at: Instant::now(),
                },
            );
        }

        self.dispose_expired().await.map(|_| ())
    }

    /// Closes and drops cold backends whose rotation happened longer ago
    /// than `retention_period`. Returns how many were disposed.
    pub async fn dispose_expired(&self) -> Result<usize, Error> {
        let expired: Vec<Arc<dyn Backend>> = {
            let mut state = self.state.write();
            let now = Instant::now();
            let retention = self.retention_period;
            let mut expired = Vec::new();
            state.cold.retain(|entry| {
                if retention > Duration::ZERO && now.duration_since(entry.rotated_at) >= retention {
                    expired.push(Arc::clone(&entry.backend));
                    false
                } else {
                    true
                }
            });
            expired
        };
        let count = expired.len();
        let mut combined: Result<(), Error> = Ok(());
        for backend in expired {
            backend.set_delete_path(true);
            let outcome = backend.close().await;
            combined = match combined {
                Ok(()) => outcome,
                Err(e) => e.merge(outcome),
            };
        }
        combined.map(|()| count)
    }

    pub fn cold_backend_count(&self) -> usize {
        self.state.read().cold.len()
    }

    /// Closes the primary and every cold backend, accumulating failures
    /// from each rather than stopping at the first.
    pub async fn close(&self) -> Result<(), Error> {
        let (primary, cold_backends) = {
            let state = self.state.read();
            (
                Arc::clone(&state.primary),
                state.cold.iter().map(|e| Arc::clone(&e.backend)).collect::<Vec<_>>(),
            )
        };
        let mut combined = primary.close().await;
        for backend in cold_backends {
            let outcome = backend.close().await;
            combined = match combined {
                Ok(()) => outcome,
                Err(e) => e.merge(outcome),
            };
        }
        combined
    }
}
