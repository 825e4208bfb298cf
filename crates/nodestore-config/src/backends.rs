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

//! Backend-selection configuration.
//!
//! Mirrors the shape of a tagged store configuration: one enum variant per
//! backend kind, each carrying only the fields that backend understands.

use serde::{Deserialize, Serialize};

#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum BackendConfig {
    /// Memory backend stores every node in a `HashMap` guarded by a single
    /// reader-writer lock. Nothing is persisted across restarts.
    memory(MemoryBackendConfig),

    /// LSM backend persists nodes through an embedded LSM key-value engine.
    /// This is the production backend.
    lsm(LsmBackendConfig),

    /// Rotating backend composes one writable primary backend with an
    /// age-ordered chain of read-only archives, each constructed the same
    /// way the primary is but rooted at a timestamped path.
    rotating(RotatingBackendConfig),
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct MemoryBackendConfig {}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LsmBackendConfig {
    /// Directory the engine's data files live in.
    pub path: String,

    /// Whether to create `path` if it does not already exist.
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,

    /// Block cache budget in bytes. Clamped to `[128 MiB, 1 GiB]` and
    /// otherwise scaled with available memory by the caller.
    ///
    /// Default: 256 MiB.
    #[serde(default = "default_block_cache_bytes")]
    pub block_cache_bytes: usize,

    /// Memtable size in bytes.
    ///
    /// Default: 64 MiB.
    #[serde(default = "default_memtable_bytes")]
    pub memtable_bytes: usize,

    /// Number of background compaction threads. Defaults to the number of
    /// available CPUs when unset.
    #[serde(default)]
    pub compaction_threads: Option<usize>,
}

const fn default_create_if_missing() -> bool {
    true
}

const fn default_block_cache_bytes() -> usize {
    256 * 1024 * 1024
}

const fn default_memtable_bytes() -> usize {
    64 * 1024 * 1024
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RotatingBackendConfig {
    /// Configuration of the hot, writable primary backend.
    pub primary: Box<BackendConfig>,

    /// Base path that rotated (archived) backends are constructed under.
    /// Each rotation appends `_<unix_nanos>` to this path.
    pub rotating_base_path: String,

    /// Number of writes to the primary before `should_rotate()` starts
    /// returning true. The caller decides when to actually rotate.
    #[serde(default = "default_rotation_threshold")]
    pub rotation_threshold: u64,

    /// Maximum age of a rotating (archived) backend before it is disposed
    /// on the next `rotate()` call.
    #[serde(with = "humantime_serde", default = "default_retention_period")]
    pub retention_period: std::time::Duration,
}

const fn default_rotation_threshold() -> u64 {
    1_000_000
}

fn default_retention_period() -> std::time::Duration {
    std::time::Duration::from_secs(7 * 24 * 3600)
}
