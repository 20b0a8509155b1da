// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed node persistence.
//!
//! [`NodeStore`] narrows a bucketed [`KVStore`] down to what the engine
//! needs: fetch, idempotent put, put-if-absent and delete of canonical node
//! serializations keyed by their hash, all under one bucket. Store failures
//! are wrapped with the offending hash prefix for diagnosis.

use anyhow::{Context, Result};
use backtrace::Backtrace;
use raw_kv::{KVStore, StoreError};
use tracing::debug;

use crate::error::TrieError;
use crate::hash::NodeHash;
use crate::node::Node;

pub(crate) struct NodeStore<S> {
    kv: S,
    bucket: String,
}

impl<S: KVStore> NodeStore<S> {
    pub fn new(kv: S, bucket: &str) -> Self {
        NodeStore {
            kv,
            bucket: bucket.to_string(),
        }
    }

    /// Fetches and decodes the node stored under `hash`. A referenced hash
    /// missing from the store means the structure is corrupt.
    pub fn get_node(&self, hash: &NodeHash) -> Result<Node> {
        let bytes = self
            .kv
            .get(&self.bucket, hash.as_bytes())
            .map_err(|source| store_err(hash, source))?;
        let bytes = match bytes {
            Some(bytes) => bytes,
            None => {
                debug!("missing node backtrace: {:#?}", Backtrace::new());
                return Err(TrieError::InvalidPatricia)
                    .with_context(|| format!("missing node at {}", hash.short_hex()));
            }
        };
        Node::decode(&bytes)
            .context(TrieError::InvalidPatricia)
            .with_context(|| format!("node {}", hash.short_hex()))
    }

    /// Persists `node` under its hash, overwriting idempotently. Used on the
    /// delete path, which may revive a shape that existed before.
    pub fn put_node(&self, node: &Node) -> Result<NodeHash> {
        let hash = node.merkle_hash();
        let bytes = node.encode()?;
        self.kv
            .put(&self.bucket, hash.as_bytes(), &bytes)
            .map_err(|source| store_err(&hash, source))?;
        Ok(hash)
    }

    /// Persists `node` under its hash, failing if the hash is already
    /// present. Used on the insert path, where every write must be new.
    pub fn put_node_new(&self, node: &Node) -> Result<NodeHash> {
        let hash = node.merkle_hash();
        let bytes = node.encode()?;
        self.kv
            .put_if_not_exists(&self.bucket, hash.as_bytes(), &bytes)
            .map_err(|source| store_err(&hash, source))?;
        Ok(hash)
    }

    /// Removes the serialization stored under `hash`. Deleting a hash that
    /// was never persisted (the pristine root) is a no-op.
    pub fn delete_node(&self, hash: &NodeHash) -> Result<()> {
        self.kv
            .delete(&self.bucket, hash.as_bytes())
            .map_err(|source| store_err(hash, source))
    }

    pub fn close(&self) -> Result<()> {
        self.kv
            .close()
            .map_err(anyhow::Error::new)
            .context("closing node store")
    }

    #[cfg(test)]
    pub fn kv(&self) -> &S {
        &self.kv
    }
}

fn store_err(hash: &NodeHash, source: StoreError) -> anyhow::Error {
    anyhow::Error::new(TrieError::Store {
        hash: hash.short_hex(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LeafNode;
    use raw_kv::MemoryStore;

    fn store() -> NodeStore<MemoryStore> {
        NodeStore::new(MemoryStore::new(), "trie")
    }

    fn leaf() -> Node {
        Node::Leaf(LeafNode::new(
            crate::nibble::bytes_to_nibbles(&[0xca, 0xfe]),
            vec![0x01],
        ))
    }

    #[test]
    fn test_round_trip() {
        let store = store();
        let node = leaf();
        let hash = store.put_node_new(&node).unwrap();
        assert_eq!(store.get_node(&hash).unwrap(), node);
    }

    #[test]
    fn test_put_new_rejects_existing_hash() {
        let store = store();
        let node = leaf();
        store.put_node_new(&node).unwrap();
        let err = store.put_node_new(&node).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrieError>(),
            Some(TrieError::Store { .. })
        ));
        // the idempotent variant shrugs it off
        store.put_node(&node).unwrap();
    }

    #[test]
    fn test_missing_node_is_corruption() {
        let store = store();
        let err = store.get_node(&NodeHash::random()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrieError>(),
            Some(TrieError::InvalidPatricia)
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = store();
        let node = leaf();
        let hash = store.put_node_new(&node).unwrap();
        store.delete_node(&hash).unwrap();
        store.delete_node(&hash).unwrap();
        assert!(store.get_node(&hash).is_err());
    }
}
