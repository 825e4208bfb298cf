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

//! Asynchronous batch writer: accumulates `store()` calls and flushes
//! them to a backend either when the pending list reaches its size limit
//! or when a flush interval ticks, whichever comes first.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nodestore_error::{make_err, Code, Error};
use nodestore_util::Node;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::backend::Backend;

enum Entry {
    Node(Node, oneshot::Sender<Result<(), Error>>),
    Flush(oneshot::Sender<Result<(), Error>>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchWriterStats {
    pub nodes_written: u64,
    pub flushes: u64,
    pub flush_failures: u64,
}

struct Worker {
    backend: Arc<dyn Backend>,
    rx: mpsc::Receiver<Entry>,
    pending: Vec<Node>,
    waiters: Vec<oneshot::Sender<Result<(), Error>>>,
    limit_size: usize,
    sync_on_flush: bool,
    stats: Arc<WorkerStats>,
}

struct WorkerStats {
    nodes_written: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
}

impl Worker {
    async fn flush(&mut self) {
        if self.pending.is_empty() {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(Ok(()));
            }
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len() as u64;
        let result = self.backend.store_batch(batch).await;
        let result = match result {
            Ok(()) if self.sync_on_flush => self.backend.sync().await,
            other => other,
        };
        match &result {
            Ok(()) => {
                self.stats.nodes_written.fetch_add(count, Ordering::Relaxed);
                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.flush_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(clone_result(&result));
        }
    }

    async fn run(mut self, flush_interval: Duration) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                maybe_entry = self.rx.recv() => {
                    match maybe_entry {
                        Some(Entry::Node(node, done)) => {
                            self.pending.push(node);
                            self.waiters.push(done);
                            if self.pending.len() >= self.limit_size {
                                self.flush().await;
                            }
                        }
                        Some(Entry::Flush(done)) => {
                            self.waiters.push(done);
                            self.flush().await;
                        }
                        None => {
                            self.flush().await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }
    }
}

fn clone_result(result: &Result<(), Error>) -> Result<(), Error> {
    result.clone()
}

/// Bounded asynchronous write buffer in front of a `Backend`. A single
/// background worker owns the pending list; `write`/`write_sync` hand
/// nodes to it over an mpsc channel so callers never block on backend
/// I/O directly.
pub struct BatchWriter {
    tx: Mutex<Option<mpsc::Sender<Entry>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<WorkerStats>,
    shutdown: AtomicBool,
}

impl BatchWriter {
    /// Spawns the worker task. `queue_capacity` bounds the mpsc channel
    /// (backpressure on `write`); `limit_size` is the pending-list size
    /// that triggers an eager flush; `flush_interval` is the time-based
    /// fallback trigger.
    pub fn new(
        backend: Arc<dyn Backend>,
        queue_capacity: usize,
        preallocation_size: usize,
        limit_size: usize,
        flush_interval: Duration,
        sync_on_flush: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let stats = Arc::new(WorkerStats {
            nodes_written: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
        });
        let worker = Worker {
            backend,
            rx,
            pending: Vec::with_capacity(preallocation_size),
            waiters: Vec::new(),
            limit_size,
            sync_on_flush,
            stats: Arc::clone(&stats),
        };
        let handle = tokio::spawn(worker.run(flush_interval));
        Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            stats,
            shutdown: AtomicBool::new(false),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Entry>, Error> {
        self.tx
            .lock()
            .clone()
            .ok_or_else(|| make_err!(Code::Shutdown, "batch writer has been stopped"))
    }

    /// Queues `node` for eventual flush. Returns once the node has been
    /// accepted by the queue, not once it's durable — the returned
    /// single-shot receiver resolves with this node's own flush outcome
    /// (`Ok` or the terminal error the flush that included it hit).
    /// Callers that don't need to know the outcome can drop it.
    pub async fn write(&self, node: Node) -> Result<oneshot::Receiver<Result<(), Error>>, Error> {
        let tx = self.sender()?;
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(Entry::Node(node, done_tx))
            .await
            .map_err(|_| make_err!(Code::Shutdown, "batch writer queue is closed"))?;
        Ok(done_rx)
    }

    /// Queues `node`, forces an immediate flush, then blocks until that
    /// flush (which includes this node) completes or fails.
    pub async fn write_sync(&self, node: Node) -> Result<(), Error> {
        let done_rx = self.write(node).await?;
        let _ = self.flush().await;
        done_rx
            .await
            .map_err(|_| make_err!(Code::Shutdown, "batch writer worker dropped before replying"))?
    }

    /// Alias kept for call sites that write a single node and want the
    /// non-blocking variant under a name that mirrors `write_sync`.
    pub async fn write_node(&self, node: Node) -> Result<oneshot::Receiver<Result<(), Error>>, Error> {
        self.write(node).await
    }

    pub async fn write_node_sync(&self, node: Node) -> Result<(), Error> {
        self.write_sync(node).await
    }

    /// Forces an immediate flush of whatever is currently pending and
    /// waits for it to complete.
    pub async fn flush(&self) -> Result<(), Error> {
        let tx = self.sender()?;
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(Entry::Flush(done_tx))
            .await
            .map_err(|_| make_err!(Code::Shutdown, "batch writer queue is closed"))?;
        done_rx
            .await
            .map_err(|_| make_err!(Code::Shutdown, "batch writer worker dropped before replying"))?
    }

    /// Stops accepting new writes, flushes whatever remains, and waits
    /// for the worker task to exit. Idempotent.
    pub async fn stop(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.tx.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.await;
        }
    }

    pub fn stats(&self) -> BatchWriterStats {
        BatchWriterStats {
            nodes_written: self.stats.nodes_written.load(Ordering::Relaxed),
            flushes: self.stats.flushes.load(Ordering::Relaxed),
            flush_failures: self.stats.flush_failures.load(Ordering::Relaxed),
        }
    }
}

/// Accumulates write results from many concurrent `BatchWriter::write`
/// callers into a single combined outcome, mirroring the error-merge
/// idiom used for parallel fan-out elsewhere in the workspace.
pub struct BatchWriteCollector {
    result: Result<(), Error>,
}

impl BatchWriteCollector {
    pub fn new() -> Self {
        Self { result: Ok(()) }
    }

    pub fn record(&mut self, outcome: Result<(), Error>) {
        let previous = std::mem::replace(&mut self.result, Ok(()));
        self.result = match previous {
            Ok(()) => outcome,
            Err(e) => e.merge(outcome),
        };
    }

    pub fn finish(self) -> Result<(), Error> {
        self.result
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
    async fn limit_size_triggers_an_eager_flush() {
        let backend = open_memory().await;
        let writer = BatchWriter::new(backend.clone(), 16, 4, 2, Duration::from_secs(60), false);
        writer.write(node(1)).await.unwrap();
        writer.write(node(2)).await.unwrap();
        // Give the worker a moment to process the eager flush trigger.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(writer.stats().nodes_written, 2);
        writer.stop().await;
    }

    #[tokio::test]
    async fn write_completion_channel_resolves_on_flush() {
        let backend = open_memory().await;
        let writer = BatchWriter::new(backend.clone(), 16, 4, 1000, Duration::from_secs(60), false);
        let n = node(1);
        let done_rx = writer.write(n.clone()).await.unwrap();
        writer.flush().await.unwrap();
        done_rx.await.unwrap().unwrap();
        assert_eq!(backend.fetch(n.hash).await.unwrap(), Some(n));
        writer.stop().await;
    }

    #[tokio::test]
    async fn write_sync_waits_for_durability() {
        let backend = open_memory().await;
        let writer = BatchWriter::new(backend.clone(), 16, 4, 100, Duration::from_secs(60), false);
        let n = node(1);
        writer.write_sync(n.clone()).await.unwrap();
        assert_eq!(backend.fetch(n.hash).await.unwrap(), Some(n));
        writer.stop().await;
    }

    #[tokio::test]
    async fn interval_tick_flushes_without_reaching_limit() {
        let backend = open_memory().await;
        let writer = BatchWriter::new(backend.clone(), 16, 4, 1000, Duration::from_millis(10), false);
        let n = node(1);
        writer.write(n.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.fetch(n.hash).await.unwrap(), Some(n));
        writer.stop().await;
    }

    #[tokio::test]
    async fn stop_flushes_pending_writes() {
        let backend = open_memory().await;
        let writer = BatchWriter::new(backend.clone(), 16, 4, 1000, Duration::from_secs(60), false);
        let n = node(1);
        writer.write(n.clone()).await.unwrap();
        writer.stop().await;
        assert_eq!(backend.fetch(n.hash).await.unwrap(), Some(n));
    }

    #[tokio::test]
    async fn writes_after_stop_are_rejected() {
        let backend = open_memory().await;
        let writer = BatchWriter::new(backend.clone(), 16, 4, 1000, Duration::from_secs(60), false);
        writer.stop().await;
        let err = writer.write(node(1)).await.unwrap_err();
        assert_eq!(err.code, Code::Shutdown);
    }

    #[test]
    fn collector_merges_ok_and_error_outcomes() {
        let mut collector = BatchWriteCollector::new();
        collector.record(Ok(()));
        collector.record(Err(make_err!(Code::BackendError, "boom")));
        let result = collector.finish();
        assert_eq!(result.unwrap_err().code, Code::BackendError);
    }
}
