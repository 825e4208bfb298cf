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

//! In-memory `Backend`, intended for tests and ephemeral deployments.
//!
//! A single `RwLock`-guarded map plus an atomic write-load counter, with
//! every read handing back a defensive copy so callers can never observe
//! or mutate storage state through a returned `Node`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use nodestore_error::{make_err, Code, Error};
use nodestore_util::{Hash256, Node};
use parking_lot::RwLock;

use crate::backend::Backend;

pub struct MemoryBackend {
    data: RwLock<HashMap<Hash256, Node>>,
    is_open: AtomicBool,
    write_load: AtomicU64,
    delete_path: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            is_open: AtomicBool::new(false),
            write_load: AtomicU64::new(0),
            delete_path: AtomicBool::new(false),
        }
    }

    fn require_open(&self) -> Result<(), Error> {
        if self.is_open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(make_err!(Code::BackendError, "memory backend is not open"))
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, _create_if_missing: bool) -> Result<(), Error> {
        if self.is_open.swap(true, Ordering::AcqRel) {
            return Err(make_err!(Code::Internal, "memory backend already open"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        if !self.is_open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if self.delete_path.load(Ordering::Acquire) {
            self.data.write().clear();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    async fn fetch(&self, hash: Hash256) -> Result<Option<Node>, Error> {
        self.require_open()?;
        Ok(self.data.read().get(&hash).cloned())
    }

    async fn fetch_batch(&self, hashes: &[Hash256]) -> Result<Vec<Option<Node>>, Error> {
        self.require_open()?;
        let map = self.data.read();
        Ok(hashes.iter().map(|h| map.get(h).cloned()).collect())
    }

    async fn store(&self, node: Node) -> Result<(), Error> {
        self.require_open()?;
        self.data.write().insert(node.hash, node);
        self.write_load.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn store_batch(&self, nodes: Vec<Node>) -> Result<(), Error> {
        self.require_open()?;
        let mut map = self.data.write();
        let count = nodes.len() as u64;
        for node in nodes {
            map.insert(node.hash, node);
        }
        drop(map);
        self.write_load.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    async fn sync(&self) -> Result<(), Error> {
        self.require_open()?;
        Ok(())
    }

    async fn for_each(&self, callback: &mut (dyn FnMut(Node) -> Result<(), Error> + Send)) -> Result<(), Error> {
        self.require_open()?;
        let snapshot: Vec<Node> = self.data.read().values().cloned().collect();
        for node in snapshot {
            callback(node)?;
        }
        Ok(())
    }

    fn get_write_load(&self) -> u64 {
        self.write_load.load(Ordering::Relaxed)
    }

    fn set_delete_path(&self, delete: bool) {
        self.delete_path.store(delete, Ordering::Release);
    }

    fn fd_required(&self) -> usize {
        0
    }
}
