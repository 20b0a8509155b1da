// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Node variants of the patricia trie.
//!
//! Three kinds make up the tree: [`BranchNode`] (a radix-16 fork),
//! [`ExtensionNode`] (path compression over a shared prefix, always leading
//! to a branch) and [`LeafNode`] (a terminal entry). A node carries two byte
//! forms with different jobs:
//!
//! - the *hash stream*, digested into the node's [`NodeHash`] identity. An
//!   empty branch contributes no bytes, which is what pins the empty-root
//!   constant to the digest of the empty stream;
//! - the *storage encoding* ([`Node::encode`] / [`Node::decode`]), a tagged
//!   canonical layout in which empty branch slots appear as 32 zero bytes.
//!
//! Paths are stored one nibble per byte and include the routing nibble of the
//! parent slot, so a branch matches zero nibbles of the search key and its
//! children restate the nibble they fork on.

#[cfg(test)]
mod node_test;

use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;
#[cfg(any(test, feature = "fuzzing"))]
use proptest_derive::Arbitrary;
use thiserror::Error;

use crate::error::TrieError;
use crate::hash::NodeHash;
use crate::nibble::{Nibble, common_prefix_len, hex_str, split_at};

/// Fan-out of a branch node.
pub(crate) const RADIX: usize = 16;

/// Leading byte of the storage encoding.
#[repr(u8)]
#[derive(FromPrimitive, ToPrimitive)]
enum NodeTag {
    Leaf = 0,
    Extension = 1,
    Branch = 2,
}

/// Outcome of matching a node against the remaining search key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Step {
    /// The key continues below this node.
    Descend { child: NodeHash, matched: usize },
    /// The key is fully consumed at this node.
    Terminal { matched: usize },
    /// The key falls off the path at this node.
    Diverge { matched: usize },
}

/// A radix-16 fork: sixteen child slots plus an optional value slot for keys
/// terminating exactly here. The engine keeps keys prefix-free and never
/// populates the value slot, but it stays part of the wire format.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct BranchNode {
    children: [Option<NodeHash>; RADIX],
    value: Option<Vec<u8>>,
}

impl Default for BranchNode {
    fn default() -> Self {
        BranchNode {
            children: [None; RADIX],
            value: None,
        }
    }
}

impl BranchNode {
    pub fn child(&self, slot: Nibble) -> Option<NodeHash> {
        self.children[usize::from(slot)]
    }

    pub fn clear_child(&mut self, slot: Nibble) {
        self.children[usize::from(slot)] = None;
    }

    /// Installs `child` at `slot` during the ascending spine rewrite.
    pub fn ascend(&mut self, child: NodeHash, slot: Nibble) {
        self.children[usize::from(slot)] = Some(child);
    }

    /// Number of occupied slots, child or value.
    pub fn occupancy(&self) -> usize {
        self.children.iter().flatten().count() + usize::from(self.value.is_some())
    }

    /// The single remaining child, if this branch holds exactly one occupant
    /// and that occupant is a child slot.
    pub fn sole_occupant(&self) -> Option<(Nibble, NodeHash)> {
        if self.value.is_some() {
            return None;
        }
        let mut found = None;
        for (i, child) in self.children.iter().enumerate() {
            if let Some(hash) = child {
                if found.is_some() {
                    return None;
                }
                found = Some((Nibble::from(i as u8), *hash));
            }
        }
        found
    }

    /// Structural deltas `(branch, ext, leaf)` of inserting below this node.
    pub fn increase(&self, _suffix: &[Nibble]) -> (u64, u64, u64) {
        (0, 0, 1)
    }

    /// Mints the leaf for `suffix` onto `minted`. The slot itself is rewired
    /// by the ascent, which already carries the slot nibble in its frame.
    pub fn insert(
        &self,
        suffix: &[Nibble],
        value: &[u8],
        minted: &mut Vec<Node>,
    ) -> Result<()> {
        if self.child(suffix[0]).is_some() {
            return Err(TrieError::InvalidPatricia)
                .with_context(|| format!("slot {} is already occupied", suffix[0]));
        }
        minted.push(Node::Leaf(LeafNode::new(suffix.to_vec(), value.to_vec())));
        Ok(())
    }

    fn hash_stream(&self) -> Vec<u8> {
        let mut stream = Vec::new();
        for child in self.children.iter().flatten() {
            stream.extend_from_slice(child.as_bytes());
        }
        if let Some(value) = &self.value {
            stream.extend_from_slice(value);
        }
        stream
    }

    pub fn merkle_hash(&self) -> NodeHash {
        NodeHash::digest(&self.hash_stream())
    }

    pub fn serialize(&self, binary: &mut Vec<u8>) -> Result<()> {
        for child in self.children.iter().copied() {
            binary.extend_from_slice(child.unwrap_or_else(NodeHash::zero).as_bytes());
        }
        match &self.value {
            Some(value) => {
                binary.write_u8(1)?;
                binary.write_u32::<LittleEndian>(value.len() as u32)?;
                binary.extend_from_slice(value);
            }
            None => binary.write_u8(0)?,
        }
        Ok(())
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let mut children = [None; RADIX];
        let mut slot = [0u8; NodeHash::LEN];
        for child in children.iter_mut() {
            reader.read_exact(&mut slot)?;
            if slot != [0u8; NodeHash::LEN] {
                *child = Some(NodeHash::new(slot));
            }
        }
        let value = match reader.read_u8()? {
            0 => None,
            1 => {
                let len = reader.read_u32::<LittleEndian>()? as usize;
                let mut value = vec![0u8; len];
                reader.read_exact(&mut value)?;
                Some(value)
            }
            flag => return Err(NodeDecodeError::UnknownValueFlag { flag }.into()),
        };
        ensure_fully_consumed(&reader, data.len())?;
        Ok(BranchNode { children, value })
    }
}

/// Path compression: a non-empty shared nibble prefix leading to a branch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ExtensionNode {
    path: Vec<Nibble>,
    child: NodeHash,
}

impl ExtensionNode {
    pub fn new(path: Vec<Nibble>, child: NodeHash) -> Self {
        assert!(!path.is_empty(), "extension path must not be empty");
        ExtensionNode { path, child }
    }

    pub fn path(&self) -> &[Nibble] {
        &self.path
    }

    pub fn child(&self) -> NodeHash {
        self.child
    }

    pub fn into_parts(self) -> (Vec<Nibble>, NodeHash) {
        (self.path, self.child)
    }

    /// Rewires the downstream hash during the ascending spine rewrite.
    pub fn ascend(&mut self, child: NodeHash) {
        self.child = child;
    }

    pub fn increase(&self, _suffix: &[Nibble]) -> (u64, u64, u64) {
        (1, 1, 1)
    }

    /// Splits this extension at its divergence from `suffix`: the shared
    /// prefix stays on this node (the ascent rewires it onto the new fork),
    /// while the remainder of the old path survives as a shorter extension
    /// beside the new leaf.
    pub fn insert(
        &mut self,
        suffix: &[Nibble],
        value: &[u8],
        minted: &mut Vec<Node>,
    ) -> Result<()> {
        let lcp = common_prefix_len(&self.path, suffix);
        if lcp == suffix.len() {
            return Err(TrieError::InvalidTrie).with_context(|| {
                format!("key ends inside extension path {}", hex_str(&self.path))
            });
        }
        if lcp == 0 || lcp == self.path.len() {
            // the descent matched the slot nibble and stopped strictly inside
            return Err(TrieError::InvalidPatricia)
                .with_context(|| format!("extension did not diverge at {}", hex_str(suffix)));
        }
        let (shared, old_fork, _) = split_at(&self.path, lcp);
        let (_, new_fork, _) = split_at(suffix, lcp);

        let remnant = ExtensionNode::new(self.path[lcp..].to_vec(), self.child);
        let added = LeafNode::new(suffix[lcp..].to_vec(), value.to_vec());
        let mut fork = BranchNode::default();
        fork.ascend(remnant.merkle_hash(), old_fork);
        fork.ascend(added.merkle_hash(), new_fork);

        self.path = shared.to_vec();
        minted.push(Node::Branch(fork));
        minted.push(Node::Extension(remnant));
        minted.push(Node::Leaf(added));
        Ok(())
    }

    fn hash_stream(&self) -> Vec<u8> {
        let mut stream = vec![NodeTag::Extension as u8];
        stream.extend(self.path.iter().map(|n| u8::from(*n)));
        stream.extend_from_slice(self.child.as_bytes());
        stream
    }

    pub fn merkle_hash(&self) -> NodeHash {
        NodeHash::digest(&self.hash_stream())
    }

    pub fn serialize(&self, binary: &mut Vec<u8>) -> Result<()> {
        binary.write_u32::<LittleEndian>(self.path.len() as u32)?;
        binary.extend(self.path.iter().map(|n| u8::from(*n)));
        binary.extend_from_slice(self.child.as_bytes());
        Ok(())
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let path = read_path(&mut reader)?;
        if path.is_empty() {
            return Err(NodeDecodeError::EmptyExtensionPath.into());
        }
        let mut child = [0u8; NodeHash::LEN];
        reader.read_exact(&mut child)?;
        ensure_fully_consumed(&reader, data.len())?;
        Ok(ExtensionNode {
            path,
            child: NodeHash::new(child),
        })
    }
}

/// A terminal entry: the unshared remainder of its key's nibbles plus the
/// stored value.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(any(test, feature = "fuzzing"), derive(Arbitrary))]
pub(crate) struct LeafNode {
    path: Vec<Nibble>,
    value: Vec<u8>,
}

impl LeafNode {
    pub fn new(path: Vec<Nibble>, value: Vec<u8>) -> Self {
        LeafNode { path, value }
    }

    pub fn path(&self) -> &[Nibble] {
        &self.path
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    pub fn into_parts(self) -> (Vec<Nibble>, Vec<u8>) {
        (self.path, self.value)
    }

    /// Overwrites the stored value, for update-in-place.
    pub fn set_value(&mut self, value: Vec<u8>) {
        self.value = value;
    }

    pub fn increase(&self, _suffix: &[Nibble]) -> (u64, u64, u64) {
        (1, 1, 1)
    }

    /// Splits this leaf against `suffix`: an extension over the shared prefix
    /// leads to a fork holding the shortened old leaf and the new one. The
    /// engine replaces this node with the minted subtree.
    pub fn insert(&self, suffix: &[Nibble], value: &[u8], minted: &mut Vec<Node>) -> Result<()> {
        let lcp = common_prefix_len(&self.path, suffix);
        if lcp == suffix.len() || lcp == self.path.len() {
            return Err(TrieError::InvalidTrie).with_context(|| {
                format!(
                    "key {} nests with existing entry {}",
                    hex_str(suffix),
                    hex_str(&self.path)
                )
            });
        }
        if lcp == 0 {
            return Err(TrieError::InvalidPatricia)
                .with_context(|| format!("leaf shares no prefix with {}", hex_str(suffix)));
        }
        let (shared, old_fork, _) = split_at(&self.path, lcp);
        let (_, new_fork, _) = split_at(suffix, lcp);

        let moved = LeafNode::new(self.path[lcp..].to_vec(), self.value.clone());
        let added = LeafNode::new(suffix[lcp..].to_vec(), value.to_vec());
        let mut fork = BranchNode::default();
        fork.ascend(moved.merkle_hash(), old_fork);
        fork.ascend(added.merkle_hash(), new_fork);
        let top = ExtensionNode::new(shared.to_vec(), fork.merkle_hash());

        minted.push(Node::Extension(top));
        minted.push(Node::Branch(fork));
        minted.push(Node::Leaf(moved));
        minted.push(Node::Leaf(added));
        Ok(())
    }

    fn hash_stream(&self) -> Vec<u8> {
        let mut stream = vec![NodeTag::Leaf as u8];
        stream.extend(self.path.iter().map(|n| u8::from(*n)));
        stream.extend_from_slice(&self.value);
        stream
    }

    pub fn merkle_hash(&self) -> NodeHash {
        NodeHash::digest(&self.hash_stream())
    }

    pub fn serialize(&self, binary: &mut Vec<u8>) -> Result<()> {
        binary.write_u32::<LittleEndian>(self.path.len() as u32)?;
        binary.extend(self.path.iter().map(|n| u8::from(*n)));
        binary.write_u32::<LittleEndian>(self.value.len() as u32)?;
        binary.extend_from_slice(&self.value);
        Ok(())
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let path = read_path(&mut reader)?;
        let len = reader.read_u32::<LittleEndian>()? as usize;
        let mut value = vec![0u8; len];
        reader.read_exact(&mut value)?;
        ensure_fully_consumed(&reader, data.len())?;
        Ok(LeafNode { path, value })
    }
}

/// The concrete node type held in the store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Node {
    Branch(BranchNode),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

impl From<BranchNode> for Node {
    fn from(node: BranchNode) -> Self {
        Node::Branch(node)
    }
}

impl From<ExtensionNode> for Node {
    fn from(node: ExtensionNode) -> Self {
        Node::Extension(node)
    }
}

impl From<LeafNode> for Node {
    fn from(node: LeafNode) -> Self {
        Node::Leaf(node)
    }
}

impl Node {
    /// Matches this node against the remaining search key. `key` must not be
    /// empty.
    pub fn step(&self, key: &[Nibble]) -> Step {
        match self {
            Node::Branch(branch) => match branch.child(key[0]) {
                Some(child) => Step::Descend { child, matched: 0 },
                None => Step::Diverge { matched: 0 },
            },
            Node::Extension(ext) => {
                let matched = common_prefix_len(ext.path(), key);
                if matched == ext.path().len() && key.len() > matched {
                    Step::Descend {
                        child: ext.child(),
                        matched,
                    }
                } else {
                    // a key ending on the extension itself names no entry
                    Step::Diverge { matched }
                }
            }
            Node::Leaf(leaf) => {
                let matched = common_prefix_len(leaf.path(), key);
                if matched == leaf.path().len() && matched == key.len() {
                    Step::Terminal { matched }
                } else {
                    Step::Diverge { matched }
                }
            }
        }
    }

    /// Path and payload of a non-branch node: the stored value for a leaf,
    /// the downstream node hash for an extension.
    pub fn blob(&self) -> Result<(&[Nibble], &[u8])> {
        match self {
            Node::Leaf(leaf) => Ok((leaf.path(), leaf.value())),
            Node::Extension(ext) => Ok((ext.path(), ext.child.as_bytes())),
            Node::Branch(_) => {
                Err(TrieError::InvalidPatricia).context("branch node carries no blob")
            }
        }
    }

    pub fn merkle_hash(&self) -> NodeHash {
        match self {
            Node::Branch(branch) => branch.merkle_hash(),
            Node::Extension(ext) => ext.merkle_hash(),
            Node::Leaf(leaf) => leaf.merkle_hash(),
        }
    }

    /// Serializes to the canonical byte form held in the store.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![];
        match self {
            Node::Leaf(leaf) => {
                out.push(NodeTag::Leaf as u8);
                leaf.serialize(&mut out)?;
            }
            Node::Extension(ext) => {
                out.push(NodeTag::Extension as u8);
                ext.serialize(&mut out)?;
            }
            Node::Branch(branch) => {
                out.push(NodeTag::Branch as u8);
                branch.serialize(&mut out)?;
            }
        }
        Ok(out)
    }

    /// Recovers a node from its canonical byte form.
    pub fn decode(val: &[u8]) -> Result<Node> {
        if val.is_empty() {
            return Err(NodeDecodeError::EmptyInput.into());
        }
        let tag = val[0];
        match NodeTag::from_u8(tag) {
            Some(NodeTag::Leaf) => Ok(Node::Leaf(LeafNode::deserialize(&val[1..])?)),
            Some(NodeTag::Extension) => Ok(Node::Extension(ExtensionNode::deserialize(&val[1..])?)),
            Some(NodeTag::Branch) => Ok(Node::Branch(BranchNode::deserialize(&val[1..])?)),
            None => Err(NodeDecodeError::UnknownTag { unknown_tag: tag }.into()),
        }
    }
}

fn read_path(reader: &mut Cursor<&[u8]>) -> Result<Vec<Nibble>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw)?;
    raw.into_iter()
        .map(|byte| {
            if byte < 16 {
                Ok(Nibble::from(byte))
            } else {
                Err(NodeDecodeError::InvalidNibble { nibble: byte }.into())
            }
        })
        .collect()
}

fn ensure_fully_consumed(reader: &Cursor<&[u8]>, len: usize) -> Result<()> {
    let remaining = len - reader.position() as usize;
    if remaining > 0 {
        return Err(NodeDecodeError::TrailingBytes { remaining }.into());
    }
    Ok(())
}

/// Error thrown when a [`Node`] fails to be deserialized out of a byte
/// sequence held in the store, via [`Node::decode`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum NodeDecodeError {
    /// Input is empty.
    #[error("missing tag due to empty input")]
    EmptyInput,

    /// The first byte of the input is not a known tag.
    #[error("lead tag byte is unknown: {}", unknown_tag)]
    UnknownTag { unknown_tag: u8 },

    /// A path byte does not fit in four bits.
    #[error("nibble byte is out of range: {}", nibble)]
    InvalidNibble { nibble: u8 },

    /// The branch value flag is neither absent nor present.
    #[error("value flag byte is unknown: {}", flag)]
    UnknownValueFlag { flag: u8 },

    /// An extension decoded with an empty path.
    #[error("extension path is empty")]
    EmptyExtensionPath,

    /// Bytes were left over after a full decode.
    #[error("extra {} bytes after decoding", remaining)]
    TrailingBytes { remaining: usize },
}
