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

//! The stored unit: a typed, hashed, timestamped byte payload.

use bytes::Bytes;
use nodestore_error::{error_if, Code, Error};

use crate::hash::Hash256;

/// Enumerated node kind. `Unknown` and `Dummy` are never valid for
/// storage — they exist as explicit placeholder tags so tests (and any
/// caller building a node before its real type is known) can construct a
/// deliberately invalid node and see it rejected by `validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NodeType {
    Unknown = 0,
    Ledger = 1,
    Account = 2,
    Transaction = 3,
    Dummy = 4,
}

impl NodeType {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(NodeType::Unknown),
            1 => Some(NodeType::Ledger),
            2 => Some(NodeType::Account),
            3 => Some(NodeType::Transaction),
            4 => Some(NodeType::Dummy),
            _ => None,
        }
    }

    /// Whether this kind may be written to a backend. `Unknown` and
    /// `Dummy` are reserved placeholder tags and are always rejected by
    /// `Node::validate`.
    pub const fn is_valid_for_storage(self) -> bool {
        !matches!(self, NodeType::Unknown | NodeType::Dummy)
    }
}

/// The stored unit: `{type, hash, data, ledger_seq, created_at}`.
///
/// The store is oblivious to what `data` means; it only preserves these
/// five fields across a store/fetch round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub node_type: NodeType,
    pub hash: Hash256,
    pub data: Bytes,
    pub ledger_seq: u32,
    pub created_at: u64,
}

impl Node {
    /// Builds a node, computing `hash` from `data`. This is the path every
    /// caller outside of tests and the codec should use — it makes it
    /// impossible to construct a node whose hash doesn't match its bytes.
    pub fn new(node_type: NodeType, data: Bytes, ledger_seq: u32, created_at: u64) -> Self {
        let hash = Hash256::digest(&data);
        Node {
            node_type,
            hash,
            data,
            ledger_seq,
            created_at,
        }
    }

    /// Validates the two invariants every stored node must satisfy:
    /// non-empty data, and a hash that matches the data's content digest.
    pub fn validate(&self) -> Result<(), Error> {
        error_if!(
            self.data.is_empty(),
            Code::InvalidNode,
            "node data must be at least 1 byte"
        );
        error_if!(
            !self.node_type.is_valid_for_storage(),
            Code::InvalidNode,
            "node type {:?} is not valid for storage",
            self.node_type
        );
        let expected = Hash256::digest(&self.data);
        error_if!(
            expected != self.hash,
            Code::InvalidNode,
            "node hash {} does not match digest {} of its data",
            self.hash,
            expected
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_computes_matching_hash() {
        let node = Node::new(NodeType::Transaction, Bytes::from_static(b"hello"), 42, 1_700_000_000_000_000_000);
        assert_eq!(node.hash, Hash256::digest(b"hello"));
        assert!(node.validate().is_ok());
    }

    #[test]
    fn empty_data_fails_validation() {
        let node = Node {
            node_type: NodeType::Transaction,
            hash: Hash256::digest(b""),
            data: Bytes::new(),
            ledger_seq: 0,
            created_at: 0,
        };
        assert_eq!(node.validate().unwrap_err().code, Code::InvalidNode);
    }

    #[test]
    fn unknown_type_fails_validation() {
        let node = Node::new(NodeType::Unknown, Bytes::from_static(b"x"), 0, 0);
        assert_eq!(node.validate().unwrap_err().code, Code::InvalidNode);
    }

    #[test]
    fn tampered_hash_fails_validation() {
        let mut node = Node::new(NodeType::Ledger, Bytes::from_static(b"x"), 0, 0);
        node.hash = Hash256::digest(b"not-x");
        assert_eq!(node.validate().unwrap_err().code, Code::InvalidNode);
    }
}
