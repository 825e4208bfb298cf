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

//! Content-addressable node storage engine.
//!
//! Composes a [`Backend`] (in-memory or RocksDB-backed) with optional
//! positive/negative caching and an asynchronous batch writer behind the
//! [`Database`] façade, plus a [`RotatingDatabase`] for hot/cold backend
//! chains and a [`Verifier`] for backend content auditing.

pub mod backend;
pub mod batch_writer;
pub mod cache;
pub mod codec;
pub mod compressor;
pub mod database;
pub mod lsm_backend;
pub mod memory_backend;
pub mod negative_cache;
pub mod rotating_database;
pub mod verifier;

mod factory;

pub use backend::{Backend, BackendInfo, BackendStatus};
pub use batch_writer::{BatchWriteCollector, BatchWriter, BatchWriterStats};
pub use cache::{Cache, CacheStats};
pub use database::{Database, DatabaseBuilder, StoreHandle};
pub use factory::{build_backend, build_database, build_rotating_database};
pub use lsm_backend::LsmBackend;
pub use memory_backend::MemoryBackend;
pub use negative_cache::{NegativeCache, NegativeCacheStats};
pub use rotating_database::RotatingDatabase;
pub use verifier::{VerificationResult, Verifier, DEFAULT_SAMPLE_LIMIT};
