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

use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod database_integration_tests {
    use super::*;
    use pretty_assertions::assert_eq; // Must be declared in every module.

    use nodestore_error::Code;
    use nodestore_store::{Backend, BatchWriter, Database, MemoryBackend, Verifier};
    use nodestore_util::{Hash256, Node, NodeType};

    fn node(tag: u8, seq: u32) -> Node {
        Node::new(NodeType::Ledger, bytes::Bytes::from(vec![tag; 32]), seq, 1)
    }

    async fn opened_memory() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.open(true).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn negative_cache_entry_is_cleared_by_a_later_store() {
        let backend = opened_memory().await;
        let db = Database::builder(backend as Arc<dyn Backend>)
            .with_negative_cache(Duration::ZERO, 0)
            .build();

        let n = node(1, 1);
        assert_eq!(db.fetch(n.hash).await.unwrap(), None);
        db.store(n.clone()).await.unwrap();
        assert_eq!(db.fetch(n.hash).await.unwrap(), Some(n));
    }

    #[tokio::test]
    async fn positive_cache_lru_respects_recency_under_combined_access() {
        let backend = opened_memory().await;
        let db = Database::builder(backend as Arc<dyn Backend>)
            .with_positive_cache(2, Duration::ZERO)
            .build();

        let a = node(1, 1);
        let b = node(2, 2);
        let c = node(3, 3);
        db.store(a.clone()).await.unwrap();
        db.store(b.clone()).await.unwrap();
        // `a` is now the LRU entry relative to `b`; storing `c` should push it out.
        db.store(c.clone()).await.unwrap();

        assert_eq!(db.fetch(a.hash).await.unwrap(), Some(a));
        assert_eq!(db.fetch(b.hash).await.unwrap(), Some(b));
        assert_eq!(db.fetch(c.hash).await.unwrap(), Some(c));
    }

    #[tokio::test]
    async fn batch_writer_limit_size_flush_is_visible_through_database() {
        let backend = opened_memory().await;
        let writer = Arc::new(BatchWriter::new(
            backend.clone() as Arc<dyn Backend>,
            16,
            4,
            2,
            Duration::from_secs(60),
            false,
        ));
        let db = Database::builder(backend.clone() as Arc<dyn Backend>)
            .with_batch_writer(writer)
            .build();

        let a = node(1, 1);
        let b = node(2, 2);
        db.store_async(a.clone()).await.unwrap();
        db.store_async(b.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(backend.fetch(a.hash).await.unwrap(), Some(a));
        assert_eq!(backend.fetch(b.hash).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn verifier_catches_a_tampered_node_written_directly_to_the_backend() {
        let backend = opened_memory().await;
        let mut tampered = node(1, 1);
        tampered.hash = Hash256::digest(b"wrong-digest-entirely");
        backend.store(tampered.clone()).await.unwrap();
        backend.store(node(2, 2)).await.unwrap();

        let result = Verifier::new(backend as Arc<dyn Backend>).run(|_| {}).await.unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.mismatches, 1);
        assert!(result.sample_hashes.contains(&tampered.hash));
    }

    #[tokio::test]
    async fn storing_an_invalid_node_is_rejected_before_it_reaches_the_backend() {
        let backend = opened_memory().await;
        let db = Database::builder(backend.clone() as Arc<dyn Backend>).build();

        let mut invalid = node(1, 1);
        invalid.data = bytes::Bytes::new();
        let err = db.store(invalid).await.unwrap_err();
        assert_eq!(err.code, Code::InvalidNode);
        assert_eq!(backend.get_write_load(), 0);
    }

    #[tokio::test]
    async fn close_drains_batch_writer_before_backend_goes_away() {
        let backend = opened_memory().await;
        let writer = Arc::new(BatchWriter::new(
            backend.clone() as Arc<dyn Backend>,
            16,
            4,
            1000,
            Duration::from_secs(60),
            false,
        ));
        let db = Database::builder(backend.clone() as Arc<dyn Backend>)
            .with_negative_cache(Duration::ZERO, 0)
            .with_batch_writer(writer)
            .build();

        let n = node(1, 1);
        db.store_async(n.clone()).await.unwrap();
        db.close().await.unwrap();

        // The backend is closed by `db.close()`, but the batch writer must
        // have flushed `n` into it before that happened.
        assert_eq!(backend.get_write_load(), 1);
    }
}
