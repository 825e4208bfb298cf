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

//! Configuration records for the nodestore workspace.
//!
//! `Configuration` is the single entry point an external caller (the
//! dependency-injection container, in the system this crate was distilled
//! from) builds and validates before constructing a `Database`. Everything
//! here is plain serde-derived data; no I/O happens until a backend is
//! actually opened.

pub mod backends;

use std::time::Duration;

use nodestore_error::{error_if, Code, Error};
use serde::{Deserialize, Serialize};

pub use backends::{BackendConfig, LsmBackendConfig, MemoryBackendConfig, RotatingBackendConfig};

/// Named compressors. Only `none` and `lz4` are registered by this
/// workspace; `snappy` and `zstd` are accepted by validation (so
/// configuration files written for a fuller deployment still parse) but
/// fail at runtime with `Code::UnsupportedCompressor` if ever selected.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressorKind {
    None,
    Lz4,
    Snappy,
    Zstd,
}

impl CompressorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressorKind::None => "none",
            CompressorKind::Lz4 => "lz4",
            CompressorKind::Snappy => "snappy",
            CompressorKind::Zstd => "zstd",
        }
    }
}

/// Asynchronous batching write-path configuration. Absent (`None` in the
/// containing `Configuration`) disables the batch writer entirely and
/// `store_async` falls back to spawning a background task per call.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BatchWriterConfig {
    /// Number of pending writes to preallocate capacity for.
    #[serde(default = "default_preallocation_size")]
    pub preallocation_size: usize,

    /// Queue length at which a `write()` call triggers an immediate flush
    /// on the calling task instead of waiting for the next tick.
    #[serde(default = "default_limit_size")]
    pub limit_size: usize,

    /// Interval between ticker-triggered flushes.
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,

    /// Whether `flush()` should call the backend's `sync()` after
    /// `store_batch()` succeeds.
    #[serde(default)]
    pub sync_on_flush: bool,
}

const fn default_preallocation_size() -> usize {
    128
}

const fn default_limit_size() -> usize {
    1000
}

const fn default_flush_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        BatchWriterConfig {
            preallocation_size: default_preallocation_size(),
            limit_size: default_limit_size(),
            flush_interval: default_flush_interval(),
            sync_on_flush: false,
        }
    }
}

/// Top-level configuration record. This is the enumerated "Configuration
/// record" described by the external interface: every field is validated
/// before a `Database` is constructed from it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Configuration {
    pub backend: BackendConfig,

    /// Maximum number of entries in the positive cache. Zero disables it.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// TTL applied to positive cache entries.
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,

    /// Named compressor applied to values before they reach the backend.
    #[serde(default = "default_compressor")]
    pub compressor: CompressorKind,

    /// Compression effort level, `0..=9`.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Advisory hint for the number of reader threads a caller should size
    /// its pool to. Not enforced by this crate.
    #[serde(default = "default_read_threads")]
    pub read_threads: usize,

    /// Default batch size hint for bulk operations.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of requests to bundle per round-trip, `1..=64`.
    #[serde(default = "default_request_bundle")]
    pub request_bundle: u32,

    /// TTL for negative-cache entries. Zero disables the negative cache.
    #[serde(with = "humantime_serde", default = "default_negative_cache_ttl")]
    pub negative_cache_ttl: Duration,

    /// Maximum number of entries the negative cache may hold. Zero means
    /// unbounded.
    #[serde(default)]
    pub negative_cache_max_size: usize,

    /// Batch writer configuration. Absent disables asynchronous batching.
    #[serde(default)]
    pub batch_writer_config: Option<BatchWriterConfig>,
}

const fn default_cache_size() -> usize {
    2000
}

const fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

const fn default_compressor() -> CompressorKind {
    CompressorKind::Lz4
}

const fn default_compression_level() -> u32 {
    1
}

const fn default_read_threads() -> usize {
    8
}

const fn default_batch_size() -> usize {
    100
}

const fn default_request_bundle() -> u32 {
    4
}

const fn default_negative_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

impl Configuration {
    /// Validates every field, matching the taxonomy in the external
    /// interface: an absent/invalid backend, out-of-range compression
    /// level, or out-of-range request bundle all fail validation with
    /// `Code::InvalidConfig`.
    pub fn validate(&self) -> Result<(), Error> {
        error_if!(
            self.compression_level > 9,
            Code::InvalidConfig,
            "compression_level must be in 0..=9, got {}",
            self.compression_level
        );
        error_if!(
            self.request_bundle == 0 || self.request_bundle > 64,
            Code::InvalidConfig,
            "request_bundle must be in 1..=64, got {}",
            self.request_bundle
        );
        error_if!(
            self.batch_size == 0,
            Code::InvalidConfig,
            "batch_size must be positive"
        );
        error_if!(
            self.read_threads == 0,
            Code::InvalidConfig,
            "read_threads must be positive"
        );

        if let Some(batch_writer) = &self.batch_writer_config {
            error_if!(
                batch_writer.preallocation_size == 0,
                Code::InvalidConfig,
                "batch_writer_config.preallocation_size must be >= 1"
            );
            error_if!(
                batch_writer.limit_size < batch_writer.preallocation_size,
                Code::InvalidConfig,
                "batch_writer_config.limit_size must be >= preallocation_size"
            );
            error_if!(
                batch_writer.flush_interval.is_zero(),
                Code::InvalidConfig,
                "batch_writer_config.flush_interval must be > 0"
            );
        }

        match &self.backend {
            BackendConfig::lsm(lsm) => {
                error_if!(
                    lsm.path.is_empty(),
                    Code::InvalidConfig,
                    "path is required for the lsm backend"
                );
            }
            BackendConfig::rotating(rotating) => {
                error_if!(
                    rotating.rotating_base_path.is_empty(),
                    Code::InvalidConfig,
                    "rotating_base_path is required for the rotating backend"
                );
                validate_backend(&rotating.primary)?;
            }
            BackendConfig::memory(_) => {}
        }

        Ok(())
    }
}

fn validate_backend(backend: &BackendConfig) -> Result<(), Error> {
    if let BackendConfig::lsm(lsm) = backend {
        error_if!(
            lsm.path.is_empty(),
            Code::InvalidConfig,
            "path is required for the lsm backend"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq; // Must be declared in every module.

    fn memory_config() -> Configuration {
        Configuration {
            backend: BackendConfig::memory(MemoryBackendConfig::default()),
            cache_size: default_cache_size(),
            cache_ttl: default_cache_ttl(),
            compressor: default_compressor(),
            compression_level: default_compression_level(),
            read_threads: default_read_threads(),
            batch_size: default_batch_size(),
            request_bundle: default_request_bundle(),
            negative_cache_ttl: default_negative_cache_ttl(),
            negative_cache_max_size: 0,
            batch_writer_config: None,
        }
    }

    #[test]
    fn default_memory_config_validates() {
        assert_eq!(memory_config().validate(), Ok(()));
    }

    #[test]
    fn compression_level_out_of_range_fails() {
        let mut config = memory_config();
        config.compression_level = 10;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code, Code::InvalidConfig);
    }

    #[test]
    fn request_bundle_zero_fails() {
        let mut config = memory_config();
        config.request_bundle = 0;
        assert_eq!(config.validate().unwrap_err().code, Code::InvalidConfig);
    }

    #[test]
    fn lsm_backend_requires_path() {
        let mut config = memory_config();
        config.backend = BackendConfig::lsm(LsmBackendConfig {
            path: String::new(),
            create_if_missing: true,
            block_cache_bytes: 256 * 1024 * 1024,
            memtable_bytes: 64 * 1024 * 1024,
            compaction_threads: None,
        });
        assert_eq!(config.validate().unwrap_err().code, Code::InvalidConfig);
    }

    #[test]
    fn batch_writer_limit_below_preallocation_fails() {
        let mut config = memory_config();
        config.batch_writer_config = Some(BatchWriterConfig {
            preallocation_size: 100,
            limit_size: 10,
            flush_interval: Duration::from_secs(1),
            sync_on_flush: false,
        });
        assert_eq!(config.validate().unwrap_err().code, Code::InvalidConfig);
    }

    #[test]
    fn parses_from_json5() {
        let json = r#"{
            backend: { lsm: { path: "/var/lib/nodestore" } },
            compressor: "lz4",
        }"#;
        let config: Configuration = serde_json5::from_str(json).unwrap();
        assert_eq!(config.compressor, CompressorKind::Lz4);
        assert_eq!(config.cache_size, default_cache_size());
    }
}
