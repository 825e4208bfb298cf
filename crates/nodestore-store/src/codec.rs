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

//! Framed on-disk record codec.
//!
//! ```text
//! [type:u32][ledger_seq:u32][created_at:u64][length:u32][payload:L bytes][compressed:u8]
//!     4B           4B             8B              4B          variable          1B
//! ```
//!
//! All integers are little-endian. The hash is never part of the encoded
//! value — it is the backend's key. Decoding yields everything else a
//! `Node` needs; the caller fills in `hash` from the key it looked up.

use bytes::Bytes;
use nodestore_error::{make_err, Code, Error};
use nodestore_util::NodeType;

use crate::compressor::{decompress_if_needed, maybe_compress, Compressor};

/// `type(4) + ledger_seq(4) + created_at(8) + length(4)` before the
/// variable-length payload and the trailing compression flag byte.
const HEADER_SIZE: usize = 20;

/// Minimum legal record size: header plus the trailing flag byte with a
/// zero-length payload.
pub const MIN_RECORD_SIZE: usize = HEADER_SIZE + 1;

/// Everything a decoded record carries except the key-derived hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub node_type: NodeType,
    pub ledger_seq: u32,
    pub created_at: u64,
    pub data: Bytes,
}

/// Encodes `(node_type, ledger_seq, created_at, data)` into the framed
/// on-disk layout, applying the compressor's size/ratio policy via
/// [`maybe_compress`].
pub fn encode(
    node_type: NodeType,
    ledger_seq: u32,
    created_at: u64,
    data: &[u8],
    compressor: &dyn Compressor,
    compression_level: u32,
) -> Result<Vec<u8>, Error> {
    let (payload, was_compressed) = maybe_compress(compressor, data, compression_level)?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + 1);
    buf.extend_from_slice(&node_type.as_u32().to_le_bytes());
    buf.extend_from_slice(&ledger_seq.to_le_bytes());
    buf.extend_from_slice(&created_at.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.push(u8::from(was_compressed));
    Ok(buf)
}

/// Decodes a framed record, applying decompression according to the
/// trailing flag byte.
pub fn decode(bytes: &[u8], compressor: &dyn Compressor) -> Result<DecodedRecord, Error> {
    if bytes.len() < MIN_RECORD_SIZE {
        return Err(make_err!(
            Code::CorruptData,
            "record too short: {} bytes, minimum is {}",
            bytes.len(),
            MIN_RECORD_SIZE
        ));
    }

    let node_type_raw = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let node_type = NodeType::from_u32(node_type_raw)
        .ok_or_else(|| make_err!(Code::CorruptData, "unknown node type tag: {}", node_type_raw))?;
    let ledger_seq = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let created_at = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let length = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;

    let total_size = HEADER_SIZE + length + 1;
    if bytes.len() != total_size {
        return Err(make_err!(
            Code::CorruptData,
            "record framing mismatch: declared length {} implies total size {}, got {} bytes",
            length,
            total_size,
            bytes.len()
        ));
    }

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + length];
    let compressed_flag = bytes[HEADER_SIZE + length];
    let was_compressed = match compressed_flag {
        0 => false,
        1 => true,
        other => {
            return Err(make_err!(
                Code::CorruptData,
                "invalid compression flag byte: {}",
                other
            ))
        }
    };

    let data = decompress_if_needed(compressor, payload, was_compressed)?;

    Ok(DecodedRecord {
        node_type,
        ledger_seq,
        created_at,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{Lz4Compressor, NoneCompressor};
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_decode_idempotence_small_payload() {
        let encoded = encode(
            NodeType::Transaction,
            42,
            1_700_000_000_000_000_000,
            b"hello",
            &NoneCompressor,
            1,
        )
        .unwrap();
        assert_eq!(encoded.len(), MIN_RECORD_SIZE + 5);
        assert_eq!(*encoded.last().unwrap(), 0, "short payload must not be compressed");

        let decoded = decode(&encoded, &NoneCompressor).unwrap();
        assert_eq!(decoded.node_type, NodeType::Transaction);
        assert_eq!(decoded.ledger_seq, 42);
        assert_eq!(decoded.created_at, 1_700_000_000_000_000_000);
        assert_eq!(decoded.data.as_ref(), b"hello");
    }

    #[test]
    fn encode_decode_round_trips_with_compression() {
        let data = vec![b'a'; 4096];
        let encoded = encode(NodeType::Ledger, 7, 100, &data, &Lz4Compressor, 1).unwrap();
        assert_eq!(*encoded.last().unwrap(), 1, "highly compressible payload should be flagged compressed");
        let decoded = decode(&encoded, &Lz4Compressor).unwrap();
        assert_eq!(decoded.data.as_ref(), data.as_slice());
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = decode(&[0u8; 5], &NoneCompressor).unwrap_err();
        assert_eq!(err.code, Code::CorruptData);
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut encoded = encode(NodeType::Account, 1, 1, b"abc", &NoneCompressor, 1).unwrap();
        // Corrupt the declared length field to claim more payload than exists.
        encoded[16..20].copy_from_slice(&100u32.to_le_bytes());
        let err = decode(&encoded, &NoneCompressor).unwrap_err();
        assert_eq!(err.code, Code::CorruptData);
    }

    #[test]
    fn decode_rejects_bad_compression_flag() {
        let mut encoded = encode(NodeType::Account, 1, 1, b"abc", &NoneCompressor, 1).unwrap();
        let last = encoded.len() - 1;
        encoded[last] = 7;
        let err = decode(&encoded, &NoneCompressor).unwrap_err();
        assert_eq!(err.code, Code::CorruptData);
    }

    #[test]
    fn decode_rejects_unknown_node_type() {
        let mut encoded = encode(NodeType::Account, 1, 1, b"abc", &NoneCompressor, 1).unwrap();
        encoded[0..4].copy_from_slice(&99u32.to_le_bytes());
        let err = decode(&encoded, &NoneCompressor).unwrap_err();
        assert_eq!(err.code, Code::CorruptData);
    }
}
