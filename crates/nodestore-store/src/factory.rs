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

//! Builds concrete backends (and the positive/negative caches and batch
//! writer layered on top of them) from a [`nodestore_config::Configuration`],
//! the way a dependency-injection container elsewhere in the system this
//! crate serves would wire components together from parsed config.

use std::sync::Arc;

use nodestore_config::{BackendConfig, Configuration};
use nodestore_error::{make_err, Code, Error};

use crate::backend::Backend;
use crate::batch_writer::BatchWriter;
use crate::compressor::lookup_compressor;
use crate::database::Database;
use crate::lsm_backend::LsmBackend;
use crate::memory_backend::MemoryBackend;
use crate::rotating_database::RotatingDatabase;

/// Constructs an unopened [`Backend`] from `backend_config`, encoding LSM
/// values with the named `compressor` at `compression_level`. Callers are
/// responsible for calling `open()` before use.
pub fn build_backend(
    backend_config: &BackendConfig,
    compressor: &str,
    compression_level: u32,
) -> Result<Arc<dyn Backend>, Error> {
    match backend_config {
        BackendConfig::memory(_) => Ok(Arc::new(MemoryBackend::new())),
        BackendConfig::lsm(lsm) => {
            let compressor = lookup_compressor(compressor)?;
            Ok(Arc::new(LsmBackend::new(
                lsm.path.clone(),
                lsm.create_if_missing,
                lsm.block_cache_bytes,
                lsm.compaction_threads,
                compressor,
                compression_level,
            )))
        }
        BackendConfig::rotating(_) => Err(make_err!(
            Code::UnsupportedBackend,
            "use build_rotating_database to construct a rotating backend"
        )),
    }
}

/// Constructs a [`RotatingDatabase`] from a `rotating` backend config.
/// Each rotated backend is built the same way as the primary, rooted at
/// `rotating_base_path` suffixed with `_<unix_nanos>` per rotation.
pub fn build_rotating_database(config: &Configuration) -> Result<RotatingDatabase, Error> {
    let BackendConfig::rotating(rotating) = &config.backend else {
        return Err(make_err!(
            Code::InvalidConfig,
            "build_rotating_database requires a rotating backend config"
        ));
    };

    let compressor = config.compressor.as_str();
    let compression_level = config.compression_level;
    let primary = build_backend(&rotating.primary, compressor, compression_level)?;
    let primary_template = (*rotating.primary).clone();
    let base_path = rotating.rotating_base_path.clone();
    let rotation_threshold = rotating.rotation_threshold;
    let retention_period = rotating.retention_period;
    let compressor_name = compressor.to_string();

    let next_primary = move || -> Arc<dyn Backend> {
        let unix_nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let rooted = root_backend_config(&primary_template, &base_path, unix_nanos);
        build_backend(&rooted, &compressor_name, compression_level).unwrap_or_else(|_| Arc::new(MemoryBackend::new()))
    };

    Ok(RotatingDatabase::new(
        primary,
        rotation_threshold,
        retention_period,
        Box::new(next_primary),
    ))
}

fn root_backend_config(template: &BackendConfig, base_path: &str, unix_nanos: u128) -> BackendConfig {
    match template {
        BackendConfig::lsm(lsm) => BackendConfig::lsm(nodestore_config::LsmBackendConfig {
            path: format!("{base_path}_{unix_nanos}"),
            create_if_missing: lsm.create_if_missing,
            block_cache_bytes: lsm.block_cache_bytes,
            memtable_bytes: lsm.memtable_bytes,
            compaction_threads: lsm.compaction_threads,
        }),
        other => other.clone(),
    }
}

/// Builds a [`Database`] (backend plus caches and optional batch writer)
/// from a non-rotating `Configuration`. Use [`build_rotating_database`]
/// instead when `config.backend` is `BackendConfig::rotating`.
pub fn build_database(config: &Configuration) -> Result<Database, Error> {
    config.validate()?;
    if matches!(config.backend, BackendConfig::rotating(_)) {
        return Err(make_err!(
            Code::InvalidConfig,
            "build_database does not accept a rotating backend; use build_rotating_database"
        ));
    }

    let backend = build_backend(&config.backend, config.compressor.as_str(), config.compression_level)?;
    let mut builder = Database::builder(backend.clone());

    if config.cache_size > 0 {
        builder = builder.with_positive_cache(config.cache_size, config.cache_ttl);
    }
    if !config.negative_cache_ttl.is_zero() || config.negative_cache_max_size > 0 {
        builder = builder.with_negative_cache(config.negative_cache_ttl, config.negative_cache_max_size);
    }
    if let Some(batch_writer_config) = &config.batch_writer_config {
        let writer = Arc::new(BatchWriter::new(
            backend,
            batch_writer_config.limit_size * 2,
            batch_writer_config.preallocation_size,
            batch_writer_config.limit_size,
            batch_writer_config.flush_interval,
            batch_writer_config.sync_on_flush,
        ));
        builder = builder.with_batch_writer(writer);
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodestore_config::MemoryBackendConfig;
    use pretty_assertions::assert_eq;

    fn memory_config() -> Configuration {
        Configuration {
            backend: BackendConfig::memory(MemoryBackendConfig::default()),
            cache_size: 10,
            cache_ttl: std::time::Duration::from_secs(60),
            compressor: nodestore_config::CompressorKind::Lz4,
            compression_level: 1,
            read_threads: 1,
            batch_size: 1,
            request_bundle: 1,
            negative_cache_ttl: std::time::Duration::ZERO,
            negative_cache_max_size: 0,
            batch_writer_config: None,
        }
    }

    #[test]
    fn build_backend_rejects_rotating_directly() {
        let config = BackendConfig::rotating(nodestore_config::RotatingBackendConfig {
            primary: Box::new(BackendConfig::memory(MemoryBackendConfig::default())),
            rotating_base_path: "/tmp/x".to_string(),
            rotation_threshold: 1,
            retention_period: std::time::Duration::ZERO,
        });
        let err = build_backend(&config, "lz4", 1).unwrap_err();
        assert_eq!(err.code, Code::UnsupportedBackend);
    }

    #[tokio::test]
    async fn build_database_wires_memory_backend() {
        let db = build_database(&memory_config()).unwrap();
        db.backend().open(true).await.unwrap();
    }

    #[test]
    fn build_database_rejects_rotating_backend() {
        let mut config = memory_config();
        config.backend = BackendConfig::rotating(nodestore_config::RotatingBackendConfig {
            primary: Box::new(BackendConfig::memory(MemoryBackendConfig::default())),
            rotating_base_path: "/tmp/x".to_string(),
            rotation_threshold: 1,
            retention_period: std::time::Duration::ZERO,
        });
        let err = build_database(&config).unwrap_err();
        assert_eq!(err.code, Code::InvalidConfig);
    }
}
