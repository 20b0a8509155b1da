// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Root-to-terminal descent.
//!
//! [`descend`] walks the trie from the root along a nibble key and returns a
//! [`Walk`]: the spine of typed frames it passed through, the terminal node,
//! and how many nibbles matched. The key exists iff `matched` equals the key
//! length, in which case the terminal is the entry's leaf. Each frame records
//! the hash its node was fetched under, which is the address the ascent must
//! delete the stale serialization at; branch frames additionally record the
//! slot taken, which is the slot the ascent rewrites.

use anyhow::{Context, Result};
use raw_kv::KVStore;

use crate::error::TrieError;
use crate::hash::NodeHash;
use crate::nibble::Nibble;
use crate::node::{BranchNode, ExtensionNode, LeafNode, Node, Step};
use crate::store::NodeStore;

/// One spine entry of a descent.
pub(crate) enum Frame {
    Branch {
        node: BranchNode,
        slot: Nibble,
        stored: NodeHash,
    },
    Extension {
        node: ExtensionNode,
        stored: NodeHash,
    },
    Leaf {
        node: LeafNode,
        stored: NodeHash,
    },
}

/// Result of a descent: the spine, the node the walk ended on, and the
/// number of key nibbles matched. On divergence `matched` excludes the
/// partial match inside the diverging node, so the remaining suffix is
/// `key[matched..]`.
pub(crate) struct Walk {
    pub frames: Vec<Frame>,
    pub terminal: Node,
    pub matched: usize,
}

pub(crate) fn descend<S: KVStore>(
    store: &NodeStore<S>,
    root: &BranchNode,
    key: &[Nibble],
) -> Result<Walk> {
    let mut frames = Vec::new();
    let mut node = Node::Branch(root.clone());
    let mut stored = node.merkle_hash();
    let mut matched_total = 0;
    let mut remaining = key;

    // A well-formed trie consumes at least one nibble every other step, so a
    // longer walk means the node graph is cyclic or corrupt.
    let max_steps = 2 * key.len() + 2;
    for _ in 0..max_steps {
        match node.step(remaining) {
            Step::Descend { child, matched } => {
                frames.push(frame(node, remaining[0], stored));
                node = store
                    .get_node(&child)
                    .with_context(|| format!("descending at nibble {}", matched_total))?;
                stored = child;
                matched_total += matched;
                remaining = &remaining[matched..];
            }
            Step::Terminal { matched } => {
                frames.push(frame(node.clone(), remaining[0], stored));
                return Ok(Walk {
                    frames,
                    terminal: node,
                    matched: matched_total + matched,
                });
            }
            Step::Diverge { .. } => {
                frames.push(frame(node.clone(), remaining[0], stored));
                return Ok(Walk {
                    frames,
                    terminal: node,
                    matched: matched_total,
                });
            }
        }
    }
    Err(TrieError::InvalidPatricia).context("descent did not terminate")
}

fn frame(node: Node, slot: Nibble, stored: NodeHash) -> Frame {
    match node {
        Node::Branch(node) => Frame::Branch { node, slot, stored },
        Node::Extension(node) => Frame::Extension { node, stored },
        Node::Leaf(node) => Frame::Leaf { node, stored },
    }
}
