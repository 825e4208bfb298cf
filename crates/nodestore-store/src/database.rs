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

//! `Database`: the public façade composing a backend with an optional
//! positive cache, negative cache, and batch writer.
//!
//! Read path: positive cache -> negative cache -> backend, populating
//! the positive cache (and clearing any stale negative entry) on a
//! backend hit, and marking the negative cache on a confirmed miss.
//! Write path: backend (directly or via the batch writer) then
//! invalidate the negative cache and warm the positive cache, in that
//! order, so no reader can observe a negative entry for a hash that has
//! already been durably written.

use std::sync::Arc;
use std::time::Duration;

use nodestore_error::{make_err, Code, Error};
use nodestore_util::{Hash256, Node};
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, BackendStatus};
use crate::batch_writer::BatchWriter;
use crate::cache::Cache;
use crate::negative_cache::NegativeCache;

fn check_cancelled(token: Option<&CancellationToken>) -> Result<(), Error> {
    if token.is_some_and(CancellationToken::is_cancelled) {
        Err(make_err!(Code::Cancelled, "operation cancelled"))
    } else {
        Ok(())
    }
}

/// Outcome handle returned by [`Database::store_async`]. When a batch
/// writer is configured the write has already been synchronously
/// accepted by the time this is returned, so `wait()` resolves
/// immediately; otherwise it resolves once the background `store` task
/// this handle was spawned for completes.
pub enum StoreHandle {
    Immediate,
    Spawned(tokio::sync::oneshot::Receiver<Result<(), Error>>),
}

impl StoreHandle {
    pub async fn wait(self) -> Result<(), Error> {
        match self {
            StoreHandle::Immediate => Ok(()),
            StoreHandle::Spawned(rx) => rx
                .await
                .map_err(|_| make_err!(Code::Internal, "background store task dropped before replying"))?,
        }
    }
}

/// Composition root for a single backend plus its optional caching and
/// batching layers. Constructed via [`DatabaseBuilder`].
pub struct Database {
    backend: Arc<dyn Backend>,
    positive_cache: Option<Arc<Cache>>,
    negative_cache: Option<Arc<NegativeCache>>,
    batch_writer: Option<Arc<BatchWriter>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend)
            .field("positive_cache_enabled", &self.positive_cache.is_some())
            .field("negative_cache_enabled", &self.negative_cache.is_some())
            .field("batch_writer_enabled", &self.batch_writer.is_some())
            .finish()
    }
}

impl Database {
    pub fn builder(backend: Arc<dyn Backend>) -> DatabaseBuilder {
        DatabaseBuilder::new(backend)
    }

    pub async fn fetch(&self, hash: Hash256) -> Result<Option<Node>, Error> {
        self.fetch_cancellable(hash, None).await
    }

    pub async fn fetch_cancellable(
        &self,
        hash: Hash256,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Node>, Error> {
        check_cancelled(cancel)?;

        if let Some(cache) = &self.positive_cache {
            if let Some(node) = cache.get(hash) {
                return Ok(Some(node));
            }
        }
        if let Some(negative) = &self.negative_cache {
            if negative.is_missing(hash) {
                return Ok(None);
            }
        }

        check_cancelled(cancel)?;
        let outcome = self.backend.fetch(hash).await;
        if BackendStatus::classify(&outcome) == BackendStatus::DataCorrupt {
            tracing::warn!(hash = %hash, "backend reported corrupt data on fetch");
        }
        let result = outcome?;
        match &result {
            Some(node) => {
                if let Some(cache) = &self.positive_cache {
                    cache.put(node.clone());
                }
                if let Some(negative) = &self.negative_cache {
                    negative.remove(hash);
                }
            }
            None => {
                if let Some(negative) = &self.negative_cache {
                    negative.mark_missing(hash);
                }
            }
        }
        Ok(result)
    }

    /// Stores `node` synchronously, bypassing the batch writer even if
    /// one is configured.
    pub async fn store(&self, node: Node) -> Result<(), Error> {
        self.store_cancellable(node, None).await
    }

    pub async fn store_cancellable(&self, node: Node, cancel: Option<&CancellationToken>) -> Result<(), Error> {
        check_cancelled(cancel)?;
        node.validate()?;
        let hash = node.hash;
        self.backend.store(node.clone()).await?;
        if let Some(negative) = &self.negative_cache {
            negative.remove(hash);
        }
        if let Some(cache) = &self.positive_cache {
            cache.put(node);
        }
        Ok(())
    }

    pub async fn store_batch(&self, nodes: Vec<Node>) -> Result<(), Error> {
        for node in &nodes {
            node.validate()?;
        }
        self.backend.store_batch(nodes.clone()).await?;
        for node in nodes {
            if let Some(negative) = &self.negative_cache {
                negative.remove(node.hash);
            }
            if let Some(cache) = &self.positive_cache {
                cache.put(node);
            }
        }
        Ok(())
    }

    /// If a batch writer is configured, synchronously updates the caches
    /// and hands `node` off to it, returning once the node is accepted
    /// into the write queue (not once it is durable). Otherwise runs
    /// `store` on a background task and returns a handle whose result
    /// resolves once that task completes.
    pub async fn store_async(&self, node: Node) -> Result<StoreHandle, Error> {
        node.validate()?;
        if let Some(writer) = &self.batch_writer {
            let hash = node.hash;
            writer.write(node.clone()).await?;
            if let Some(negative) = &self.negative_cache {
                negative.remove(hash);
            }
            if let Some(cache) = &self.positive_cache {
                cache.put(node);
            }
            return Ok(StoreHandle::Immediate);
        }

        let backend = Arc::clone(&self.backend);
        let positive_cache = self.positive_cache.clone();
        let negative_cache = self.negative_cache.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let hash = node.hash;
            let result = backend.store(node.clone()).await;
            if result.is_ok() {
                if let Some(negative) = &negative_cache {
                    negative.remove(hash);
                }
                if let Some(cache) = &positive_cache {
                    cache.put(node);
                }
            }
            let _ = tx.send(result);
        });
        Ok(StoreHandle::Spawned(rx))
    }

    /// Sweeps expired entries from whichever caches are configured.
    /// Returns `(positive_expired, negative_expired)`.
    pub fn sweep(&self) -> (usize, usize) {
        let positive = self.positive_cache.as_ref().map_or(0, |c| c.sweep());
        let negative = self.negative_cache.as_ref().map_or(0, |c| c.sweep());
        (positive, negative)
    }

    /// Closes layers in dependency order: batch writer first (so any
    /// pending writes land before the backend goes away), then the
    /// negative cache (stopping its sweeper), then the backend itself.
    /// Failures from each stage are accumulated rather than stopping
    /// early, so a backend close failure is never masked by an earlier
    /// batch-writer failure.
    pub async fn close(&self) -> Result<(), Error> {
        let mut combined: Result<(), Error> = Ok(());
        if let Some(writer) = &self.batch_writer {
            let outcome = writer.flush().await;
            writer.stop().await;
            combined = match combined {
                Ok(()) => outcome,
                Err(e) => e.merge(outcome),
            };
        }
        if let Some(negative) = &self.negative_cache {
            negative.close();
        }
        let outcome = self.backend.close().await;
        match combined {
            Ok(()) => outcome,
            Err(e) => e.merge(outcome),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

pub struct DatabaseBuilder {
    backend: Arc<dyn Backend>,
    positive_cache: Option<Arc<Cache>>,
    negative_cache: Option<Arc<NegativeCache>>,
    batch_writer: Option<Arc<BatchWriter>>,
}

impl DatabaseBuilder {
    fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            positive_cache: None,
            negative_cache: None,
            batch_writer: None,
        }
    }

    pub fn with_positive_cache(mut self, max_items: usize, ttl: Duration) -> Self {
        self.positive_cache = Some(Arc::new(Cache::new(max_items, ttl)));
        self
    }

    pub fn with_negative_cache(mut self, ttl: Duration, max_size: usize) -> Self {
        self.negative_cache = Some(Arc::new(NegativeCache::new(ttl, max_size)));
        self
    }

    pub fn with_batch_writer(mut self, writer: Arc<BatchWriter>) -> Self {
        self.batch_writer = Some(writer);
        self
    }

    pub fn build(self) -> Database {
        Database {
            backend: self.backend,
            positive_cache: self.positive_cache,
            negative_cache: self.negative_cache,
            batch_writer: self.batch_writer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;
    use nodestore_util::NodeType;
    use pretty_assertions::assert_eq;

    fn node(tag: u8) -> Node {
        Node::new(NodeType::Transaction, bytes::Bytes::from(vec![tag; 8]), 1, 1)
    }

    async fn open_memory() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.open(true).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn store_then_fetch_populates_positive_cache() {
        let backend = open_memory().await;
        let db = Database::builder(backend)
            .with_positive_cache(10, Duration::ZERO)
            .build();
        let n = node(1);
        db.store(n.clone()).await.unwrap();
        assert_eq!(db.fetch(n.hash).await.unwrap(), Some(n));
    }

    #[tokio::test]
    async fn miss_is_recorded_in_negative_cache() {
        let backend = open_memory().await;
        let db = Database::builder(backend)
            .with_negative_cache(Duration::ZERO, 0)
            .build();
        let missing = Hash256::digest(b"missing");
        assert_eq!(db.fetch(missing).await.unwrap(), None);
        assert!(db.negative_cache.as_ref().unwrap().is_missing(missing));
    }

    #[tokio::test]
    async fn store_clears_stale_negative_entry() {
        let backend = open_memory().await;
        let db = Database::builder(backend)
            .with_negative_cache(Duration::ZERO, 0)
            .build();
        let n = node(1);
        assert_eq!(db.fetch(n.hash).await.unwrap(), None);
        assert!(db.negative_cache.as_ref().unwrap().is_missing(n.hash));
        db.store(n.clone()).await.unwrap();
        assert!(!db.negative_cache.as_ref().unwrap().is_missing(n.hash));
        assert_eq!(db.fetch(n.hash).await.unwrap(), Some(n));
    }

    #[tokio::test]
    async fn store_async_without_batch_writer_runs_in_background() {
        let backend = open_memory().await;
        let db = Database::builder(backend).build();
        let n = node(1);
        let handle = db.store_async(n.clone()).await.unwrap();
        handle.wait().await.unwrap();
        assert_eq!(db.fetch(n.hash).await.unwrap(), Some(n));
    }

    #[tokio::test]
    async fn store_async_routes_through_batch_writer() {
        let backend = open_memory().await;
        let writer = Arc::new(BatchWriter::new(
            backend.clone() as Arc<dyn Backend>,
            16,
            4,
            1,
            Duration::from_secs(60),
            false,
        ));
        let db = Database::builder(backend.clone() as Arc<dyn Backend>)
            .with_batch_writer(writer)
            .build();
        let n = node(1);
        db.store_async(n.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.fetch(n.hash).await.unwrap(), Some(n));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_fetch() {
        let backend = open_memory().await;
        let db = Database::builder(backend).build();
        let token = CancellationToken::new();
        token.cancel();
        let err = db.fetch_cancellable(Hash256::digest(b"x"), Some(&token)).await.unwrap_err();
        assert_eq!(err.code, Code::Cancelled);
    }

    #[tokio::test]
    async fn close_is_ordered_and_idempotent_in_effect() {
        let backend = open_memory().await;
        let db = Database::builder(backend)
            .with_negative_cache(Duration::ZERO, 0)
            .build();
        db.close().await.unwrap();
    }
}
