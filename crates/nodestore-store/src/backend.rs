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

//! The backend abstraction every concrete storage engine implements.

use async_trait::async_trait;
use nodestore_error::{Code, Error};
use nodestore_util::{Hash256, Node};

/// Closed status enumeration a backend's point operations resolve to.
/// `fetch` maps `NotFound` into `Ok(None)` at the `Database` layer — a
/// missing key is never an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Ok,
    NotFound,
    DataCorrupt,
    BackendError,
    Unknown,
}

impl BackendStatus {
    /// Classifies a `fetch` outcome into the closed status enum, so
    /// callers that want to distinguish "missing" from "corrupt" from
    /// "backend failure" don't have to match on `Error::code` directly.
    pub fn classify(outcome: &Result<Option<Node>, Error>) -> Self {
        match outcome {
            Ok(Some(_)) => BackendStatus::Ok,
            Ok(None) => BackendStatus::NotFound,
            Err(e) if e.code == Code::CorruptData => BackendStatus::DataCorrupt,
            Err(e) if e.code == Code::BackendError => BackendStatus::BackendError,
            Err(_) => BackendStatus::Unknown,
        }
    }
}

/// Diagnostic snapshot of a backend, used by callers composing several
/// backends together (e.g. `RotatingDatabase` deciding whether to rotate).
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub name: &'static str,
    pub is_open: bool,
    pub fd_required: usize,
    pub write_load: u64,
}

/// Capability set every concrete storage engine implements: open/close,
/// point and batch get/put, iteration, sync, and the delete-on-close
/// marker used by `RotatingDatabase` to reclaim disposed archives.
///
/// Backends are created closed. A single `open()` call transitions them to
/// open; a second call fails. `close()` is idempotent. Every data-path
/// method on a closed backend returns `BackendStatus::BackendError`
/// (surfaced as `Code::BackendError`).
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self, create_if_missing: bool) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;

    fn is_open(&self) -> bool;

    async fn fetch(&self, hash: Hash256) -> Result<Option<Node>, Error>;

    /// `fetch`, reclassified into [`BackendStatus`] so a caller can
    /// branch on the closed status set instead of matching on
    /// `Error::code`. Never itself returns `Err` — a fetch failure is
    /// folded into `DataCorrupt`, `BackendError`, or `Unknown`.
    async fn fetch_status(&self, hash: Hash256) -> BackendStatus {
        BackendStatus::classify(&self.fetch(hash).await)
    }

    /// Batch point lookup. Slots for keys that are not found stay `None`;
    /// this is never itself an error.
    async fn fetch_batch(&self, hashes: &[Hash256]) -> Result<Vec<Option<Node>>, Error>;

    async fn store(&self, node: Node) -> Result<(), Error>;

    /// All-or-nothing: either every node in `nodes` is durable or the
    /// whole batch is reported as failed. No partial success is surfaced.
    async fn store_batch(&self, nodes: Vec<Node>) -> Result<(), Error>;

    async fn sync(&self) -> Result<(), Error>;

    /// Iterates every stored node in backend-defined order, invoking
    /// `callback` once per node. Used by the `Verifier` and by
    /// `RotatingDatabase` rotation bookkeeping.
    async fn for_each(&self, callback: &mut (dyn FnMut(Node) -> Result<(), Error> + Send)) -> Result<(), Error>;

    /// Monotonic count of successful `store`/`store_batch` calls, used by
    /// `RotatingDatabase::should_rotate`.
    fn get_write_load(&self) -> u64;

    /// Arms the one-way delete-on-close flag: on `close()`, the backend
    /// removes its data directory best-effort after the handle is
    /// released. Errors during removal are reported but never mask the
    /// close error itself.
    fn set_delete_path(&self, delete: bool);

    /// Advisory estimate of file descriptors this backend holds open,
    /// used by callers sizing an `ulimit` budget across many backends
    /// (e.g. a `RotatingDatabase` with a long archive chain).
    fn fd_required(&self) -> usize;

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: self.name(),
            is_open: self.is_open(),
            fd_required: self.fd_required(),
            write_load: self.get_write_load(),
        }
    }
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("dyn Backend").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;
    use nodestore_error::make_err;
    use nodestore_util::NodeType;
    use pretty_assertions::assert_eq;

    #[test]
    fn classify_maps_outcomes_to_status() {
        let node = Node::new(NodeType::Ledger, bytes::Bytes::from_static(b"x"), 0, 0);
        assert_eq!(BackendStatus::classify(&Ok(Some(node))), BackendStatus::Ok);
        assert_eq!(BackendStatus::classify(&Ok(None)), BackendStatus::NotFound);
        assert_eq!(
            BackendStatus::classify(&Err(make_err!(Code::CorruptData, "bad"))),
            BackendStatus::DataCorrupt
        );
        assert_eq!(
            BackendStatus::classify(&Err(make_err!(Code::BackendError, "bad"))),
            BackendStatus::BackendError
        );
        assert_eq!(
            BackendStatus::classify(&Err(make_err!(Code::Cancelled, "bad"))),
            BackendStatus::Unknown
        );
    }

    #[tokio::test]
    async fn fetch_status_reflects_a_live_backend() {
        let backend = MemoryBackend::new();
        backend.open(true).await.unwrap();
        let node = Node::new(NodeType::Ledger, bytes::Bytes::from_static(b"x"), 0, 0);
        assert_eq!(backend.fetch_status(node.hash).await, BackendStatus::NotFound);
        backend.store(node.clone()).await.unwrap();
        assert_eq!(backend.fetch_status(node.hash).await, BackendStatus::Ok);
    }
}
