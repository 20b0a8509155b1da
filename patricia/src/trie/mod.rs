// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The trie engine.
//!
//! [`Trie`] owns the in-memory root branch, the entry and structure counters,
//! and a [`NodeStore`] over the `"trie"` bucket. Every mutation descends once
//! with the cursor, applies the local node mutation, then rewrites the
//! ascending spine: each frame's stale serialization is deleted and the
//! rewritten node re-persisted bottom-up, propagating hashes toward the root.
//!
//! Persistence follows the write asymmetry of the design: nodes minted or
//! rewritten by an insert must be new by hash (`put_node_new`), while a
//! delete may roll the trie back to a shape that existed before and uses
//! idempotent `put_node`.
//!
//! The engine is single-writer; an error from a mutation can leave the
//! in-memory root ahead of (or behind) the persisted spine, and callers
//! should treat the handle as poisoned when that happens.


use std::path::Path;

use anyhow::{Context, Result};
use raw_kv::{KVStore, RocksStore};
use tracing::debug;

use crate::cursor::{Frame, descend};
use crate::error::TrieError;
use crate::hash::{EMPTY_ROOT_HASH, NodeHash};
use crate::nibble::{Nibble, bytes_to_nibbles};
use crate::node::{BranchNode, ExtensionNode, LeafNode, Node};
use crate::store::NodeStore;

/// Bucket holding all node serializations.
pub const TRIE_BUCKET: &str = "trie";

/// Payload threaded through the delete-variant ascent.
enum Unwind {
    /// The child below was deleted outright; the parent drops its slot.
    Removed,
    /// A single-occupant chain is folding upward, accumulating the nibble
    /// path that leads to the surviving subtree.
    Collapsing {
        path: Vec<Nibble>,
        survivor: NodeHash,
    },
    /// Plain spine rewrite carrying the child's new hash.
    Child(NodeHash),
}

/// A persistent Merkle Patricia Trie.
pub struct Trie<S = RocksStore> {
    store: NodeStore<S>,
    root: BranchNode,
    num_entry: u64,
    num_branch: u64,
    num_ext: u64,
    num_leaf: u64,
}

impl Trie<RocksStore> {
    /// Opens or creates the backing store at `path` and starts from whatever
    /// root the caller re-establishes by replaying inserts; a fresh store
    /// begins at the empty root.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let kv = RocksStore::open(path, &[TRIE_BUCKET]).context("opening trie store")?;
        Ok(Self::with_store(kv))
    }
}

impl<S: KVStore> Trie<S> {
    /// Builds a trie over an already-opened store.
    pub fn with_store(kv: S) -> Self {
        Trie {
            store: NodeStore::new(kv, TRIE_BUCKET),
            root: BranchNode::default(),
            num_entry: 1,
            num_branch: 1,
            num_ext: 0,
            num_leaf: 0,
        }
    }

    /// Root digest committing to the entire mapping. O(1).
    pub fn root_hash(&self) -> NodeHash {
        self.root.merkle_hash()
    }

    /// Releases the backing store. Call exactly once.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    /// Inserts a new entry. Fails with [`TrieError::InvalidTrie`] if the key
    /// is already present or nests with an existing key.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let nibbles = key_nibbles(key)?;
        let mut walk = descend(&self.store, &self.root, &nibbles)?;
        if walk.matched == nibbles.len() {
            return Err(TrieError::InvalidTrie)
                .with_context(|| format!("key = {} already exist", hex::encode(key)));
        }

        // mutate the diverging node and mint the subtree for the suffix
        let suffix = &nibbles[walk.matched..];
        let mut minted = Vec::new();
        let (nb, ne, nl) = match walk.frames.last_mut() {
            Some(Frame::Branch { node, .. }) => {
                let deltas = node.increase(suffix);
                node.insert(suffix, value, &mut minted)?;
                deltas
            }
            Some(Frame::Extension { node, .. }) => {
                let deltas = node.increase(suffix);
                node.insert(suffix, value, &mut minted)?;
                deltas
            }
            Some(Frame::Leaf { node, .. }) => {
                let deltas = node.increase(suffix);
                node.insert(suffix, value, &mut minted)?;
                deltas
            }
            None => {
                return Err(TrieError::InvalidPatricia).context("descent produced no frames");
            }
        };

        // persist the minted nodes bottom-up; each must be new by hash
        let mut child_hash = match minted.pop() {
            Some(node) => self.store.put_node_new(&node)?,
            None => {
                return Err(TrieError::InvalidPatricia).context("insert minted no nodes");
            }
        };
        while let Some(node) = minted.pop() {
            child_hash = self.store.put_node_new(&node)?;
        }

        // a diverging leaf is replaced by the minted subtree, not rewired
        if matches!(walk.frames.last(), Some(Frame::Leaf { .. })) {
            if let Some(Frame::Leaf { stored, .. }) = walk.frames.pop() {
                debug!("discard leaf {}", stored.short_hex());
                self.store.delete_node(&stored)?;
            }
        }

        self.num_branch += nb;
        self.num_ext += ne;
        self.num_leaf += nl;
        self.num_entry += 1;
        self.ascend_insert(walk.frames, child_hash)
    }

    /// Retrieves the value stored under `key`. Fails with
    /// [`TrieError::InvalidTrie`] if the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let nibbles = key_nibbles(key)?;
        let walk = descend(&self.store, &self.root, &nibbles)?;
        if walk.matched != nibbles.len() {
            return Err(TrieError::InvalidTrie)
                .with_context(|| format!("key = {} not exist", hex::encode(key)));
        }
        match walk.terminal {
            Node::Leaf(leaf) => Ok(leaf.into_value()),
            _ => Err(TrieError::InvalidPatricia).context("terminal node is not a leaf"),
        }
    }

    /// Overwrites the value of an existing entry: an in-place delete of the
    /// terminal leaf fused with the insert-variant ascent, so only one spine
    /// walk occurs. Fails with [`TrieError::InvalidTrie`] if the key is
    /// absent.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let nibbles = key_nibbles(key)?;
        let mut walk = descend(&self.store, &self.root, &nibbles)?;
        if walk.matched != nibbles.len() {
            return Err(TrieError::InvalidTrie)
                .with_context(|| format!("key = {} not exist", hex::encode(key)));
        }
        let (mut leaf, stored) = match walk.frames.pop() {
            Some(Frame::Leaf { node, stored }) => (node, stored),
            _ => return Err(TrieError::InvalidPatricia).context("terminal node is not a leaf"),
        };
        self.store.delete_node(&stored)?;
        leaf.set_value(value.to_vec());
        let child_hash = self.store.put_node(&Node::Leaf(leaf))?;
        self.ascend_insert(walk.frames, child_hash)
    }

    /// Deletes an existing entry. Fails with [`TrieError::InvalidTrie`] if
    /// the key is absent or the entry count would underflow.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let nibbles = key_nibbles(key)?;
        let mut walk = descend(&self.store, &self.root, &nibbles)?;
        if walk.matched != nibbles.len() {
            return Err(TrieError::InvalidTrie)
                .with_context(|| format!("key = {} not exist", hex::encode(key)));
        }
        let stored = match walk.frames.pop() {
            Some(Frame::Leaf { stored, .. }) => stored,
            _ => return Err(TrieError::InvalidPatricia).context("terminal node is not a leaf"),
        };
        if self.num_entry == 1 {
            return Err(TrieError::InvalidTrie).context("trie has more entries than ever added");
        }
        self.store.delete_node(&stored)?;
        self.num_entry -= 1;
        self.num_leaf -= 1;
        self.ascend_delete(walk.frames, Unwind::Removed)
    }

    /// Insert-variant spine rewrite: every frame is rewired with the
    /// propagated child hash and re-persisted as a new node.
    fn ascend_insert(&mut self, mut frames: Vec<Frame>, mut child_hash: NodeHash) -> Result<()> {
        while let Some(frame) = frames.pop() {
            let at_root = frames.is_empty();
            let node = match frame {
                Frame::Branch { mut node, slot, stored } => {
                    self.store.delete_node(&stored)?;
                    node.ascend(child_hash, slot);
                    Node::Branch(node)
                }
                Frame::Extension { mut node, stored } => {
                    self.store.delete_node(&stored)?;
                    node.ascend(child_hash);
                    Node::Extension(node)
                }
                Frame::Leaf { .. } => {
                    return Err(TrieError::InvalidPatricia).context("leaf on ascending spine");
                }
            };
            child_hash = self.store.put_node_new(&node)?;
            if at_root {
                match node {
                    Node::Branch(branch) => self.root = branch,
                    _ => {
                        return Err(TrieError::InvalidPatricia)
                            .context("spine did not end at the branch root");
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete-variant spine rewrite. Single-occupant branches fold away and
    /// extensions concatenate their paths onto the fold until a branch with
    /// other occupants (or the root) materializes the survivor; from there it
    /// degrades into a plain rewrite. All writes are idempotent puts.
    fn ascend_delete(&mut self, mut frames: Vec<Frame>, mut state: Unwind) -> Result<()> {
        while let Some(frame) = frames.pop() {
            let at_root = frames.is_empty();
            match frame {
                Frame::Branch { mut node, slot, stored } => {
                    state = match state {
                        Unwind::Child(hash) => {
                            self.store.delete_node(&stored)?;
                            node.ascend(hash, slot);
                            let hash = self.store.put_node(&Node::Branch(node.clone()))?;
                            if at_root {
                                self.root = node;
                            }
                            Unwind::Child(hash)
                        }
                        Unwind::Collapsing { path, survivor } => {
                            let folded = self.fold(&path, survivor)?;
                            self.store.delete_node(&stored)?;
                            node.ascend(folded, slot);
                            let hash = self.store.put_node(&Node::Branch(node.clone()))?;
                            if at_root {
                                self.root = node;
                            }
                            Unwind::Child(hash)
                        }
                        Unwind::Removed => {
                            node.clear_child(slot);
                            if at_root {
                                self.store.delete_node(&stored)?;
                                if node.occupancy() == 0 {
                                    // last entry gone; back to the pristine root,
                                    // which is never persisted
                                    self.root = BranchNode::default();
                                    Unwind::Child(*EMPTY_ROOT_HASH)
                                } else {
                                    let hash =
                                        self.store.put_node(&Node::Branch(node.clone()))?;
                                    self.root = node;
                                    Unwind::Child(hash)
                                }
                            } else if let Some((_, survivor)) = node.sole_occupant() {
                                // one occupant left; this branch folds away
                                self.store.delete_node(&stored)?;
                                self.num_branch -= 1;
                                Unwind::Collapsing {
                                    path: Vec::new(),
                                    survivor,
                                }
                            } else {
                                self.store.delete_node(&stored)?;
                                let hash = self.store.put_node(&Node::Branch(node.clone()))?;
                                Unwind::Child(hash)
                            }
                        }
                    };
                }
                Frame::Extension { mut node, stored } => {
                    if at_root {
                        return Err(TrieError::InvalidPatricia)
                            .context("spine did not end at the branch root");
                    }
                    state = match state {
                        Unwind::Child(hash) => {
                            self.store.delete_node(&stored)?;
                            node.ascend(hash);
                            Unwind::Child(self.store.put_node(&Node::Extension(node))?)
                        }
                        Unwind::Collapsing { path, survivor } => {
                            // fold the shared prefix into the pending node
                            self.store.delete_node(&stored)?;
                            self.num_ext -= 1;
                            let (mut folded_path, _) = node.into_parts();
                            folded_path.extend_from_slice(&path);
                            Unwind::Collapsing {
                                path: folded_path,
                                survivor,
                            }
                        }
                        Unwind::Removed => {
                            return Err(TrieError::InvalidPatricia)
                                .context("extension lost its only subtree");
                        }
                    };
                }
                Frame::Leaf { .. } => {
                    return Err(TrieError::InvalidPatricia).context("leaf on ascending spine");
                }
            }
        }
        Ok(())
    }

    /// Materializes a collapse: the surviving occupant absorbs the folded
    /// nibble prefix. A leaf merges into a longer leaf, an extension into a
    /// longer extension; either way the survivor's old serialization is
    /// displaced. The write is idempotent because a fold can revive a node
    /// shape that existed earlier.
    fn fold(&self, prefix: &[Nibble], survivor: NodeHash) -> Result<NodeHash> {
        if prefix.is_empty() {
            return Err(TrieError::InvalidPatricia)
                .context("collapse reached a branch without a path");
        }
        let folded = match self.store.get_node(&survivor)? {
            Node::Leaf(leaf) => {
                self.store.delete_node(&survivor)?;
                let (path, value) = leaf.into_parts();
                let mut full = prefix.to_vec();
                full.extend_from_slice(&path);
                Node::Leaf(LeafNode::new(full, value))
            }
            Node::Extension(ext) => {
                self.store.delete_node(&survivor)?;
                let (path, child) = ext.into_parts();
                let mut full = prefix.to_vec();
                full.extend_from_slice(&path);
                Node::Extension(ExtensionNode::new(full, child))
            }
            Node::Branch(_) => {
                return Err(TrieError::InvalidPatricia)
                    .context("branch cannot sit directly behind a branch slot");
            }
        };
        self.store.put_node(&folded)
    }
}

#[cfg(test)]
impl<S: KVStore> Trie<S> {
    /// `(num_entry, num_branch, num_ext, num_leaf)`.
    pub(crate) fn stats(&self) -> (u64, u64, u64, u64) {
        (self.num_entry, self.num_branch, self.num_ext, self.num_leaf)
    }

    pub(crate) fn kv(&self) -> &S {
        self.store.kv()
    }

    /// Every node reachable from the root, root first.
    pub(crate) fn collect_nodes(&self) -> Result<Vec<Node>> {
        let mut nodes = vec![Node::Branch(self.root.clone())];
        let mut pending: Vec<NodeHash> = child_hashes(&nodes[0]);
        while let Some(hash) = pending.pop() {
            let node = self.store.get_node(&hash)?;
            pending.extend(child_hashes(&node));
            nodes.push(node);
        }
        Ok(nodes)
    }
}

#[cfg(test)]
fn child_hashes(node: &Node) -> Vec<NodeHash> {
    match node {
        Node::Branch(branch) => (0..crate::node::RADIX as u8)
            .filter_map(|i| branch.child(Nibble::from(i)))
            .collect(),
        Node::Extension(ext) => vec![ext.child()],
        Node::Leaf(_) => vec![],
    }
}

fn key_nibbles(key: &[u8]) -> Result<Vec<Nibble>> {
    if key.is_empty() {
        return Err(TrieError::InvalidTrie).context("key must not be empty");
    }
    Ok(bytes_to_nibbles(key))
}
