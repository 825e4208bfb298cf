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

//! Named compressor registry.
//!
//! Two compressors are registered at process start: `none` (identity) and
//! `lz4` (block compression via `lz4_flex`). The registry is process-wide
//! the way the workspace's other name->constructor maps are (backend
//! names, in `database.rs`), with registration being idempotent-by-
//! overwrite so re-running init in tests is harmless.

use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::Bytes;
use nodestore_error::{make_err, Code, Error};
use parking_lot::RwLock;

/// Only invoke compression when the payload exceeds this many bytes.
/// Smaller payloads rarely compress well enough to be worth the CPU.
pub const COMPRESSION_SIZE_THRESHOLD: usize = 128;

/// A named compressor implementation.
pub trait Compressor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compresses `data` at the given effort `level`. Implementations are
    /// free to ignore `level` if the underlying algorithm has no notion of
    /// one (e.g. the identity compressor).
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, Error>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Upper bound on the compressed size of an `n`-byte input, used to
    /// size scratch buffers without reallocating.
    fn max_compressed_size(&self, n: usize) -> usize;
}

impl std::fmt::Debug for dyn Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("dyn Compressor").field(&self.name()).finish()
    }
}

/// Identity compressor. `compress` and `decompress` both return a safe
/// copy of the input so callers never observe aliasing between the
/// original buffer and the one handed back by the registry.
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, data: &[u8], _level: u32) -> Result<Vec<u8>, Error> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(data.to_vec())
    }

    fn max_compressed_size(&self, n: usize) -> usize {
        n
    }
}

/// LZ4 block compressor built on `lz4_flex`.
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8], _level: u32) -> Result<Vec<u8>, Error> {
        // lz4_flex's block API has no notion of an effort level; the
        // prepend-size framing embeds the uncompressed length so
        // `decompress` doesn't need to be told it out of band.
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| make_err!(Code::CorruptData, "lz4 decompress failed: {}", e))
    }

    fn max_compressed_size(&self, n: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(n) + std::mem::size_of::<u32>()
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Compressor> + Send + Sync>;

static REGISTRY: OnceLock<RwLock<HashMap<&'static str, Factory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<&'static str, Factory>> {
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, Factory> = HashMap::new();
        map.insert("none", Box::new(|| Box::new(NoneCompressor)));
        map.insert("lz4", Box::new(|| Box::new(Lz4Compressor)));
        RwLock::new(map)
    })
}

/// Registers (or overwrites) a compressor factory under `name`.
pub fn register_compressor(name: &'static str, factory: Factory) {
    registry().write().insert(name, factory);
}

/// Looks up a compressor by name, failing with `Code::UnsupportedCompressor`
/// if it was never registered.
pub fn lookup_compressor(name: &str) -> Result<Box<dyn Compressor>, Error> {
    registry()
        .read()
        .get(name)
        .map(|factory| factory())
        .ok_or_else(|| make_err!(Code::UnsupportedCompressor, "unsupported compressor: {}", name))
}

/// Compresses `payload` with `compressor` subject to the size and ratio
/// gates of the compression policy: only invoked above
/// `COMPRESSION_SIZE_THRESHOLD` bytes, and only kept if the compressed
/// output is at least 10% smaller than the raw payload (the tuned
/// variant's gate — see `DESIGN.md`). Returns `(bytes, was_compressed)`.
pub fn maybe_compress(
    compressor: &dyn Compressor,
    payload: &[u8],
    level: u32,
) -> Result<(Vec<u8>, bool), Error> {
    if compressor.name() == "none" || payload.len() <= COMPRESSION_SIZE_THRESHOLD {
        return Ok((payload.to_vec(), false));
    }
    let compressed = compressor.compress(payload, level)?;
    let threshold = payload.len() - (payload.len() / 10);
    if compressed.len() < threshold {
        Ok((compressed, true))
    } else {
        Ok((payload.to_vec(), false))
    }
}

pub fn decompress_if_needed(
    compressor: &dyn Compressor,
    payload: &[u8],
    was_compressed: bool,
) -> Result<Bytes, Error> {
    if was_compressed {
        Ok(Bytes::from(compressor.decompress(payload)?))
    } else {
        Ok(Bytes::copy_from_slice(payload))
    }
}
