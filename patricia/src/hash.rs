// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Node digests.
//!
//! A node's identity in the store is the BLAKE2b-256 digest of its hash
//! stream. The empty trie hashes to the digest of the empty stream, since an
//! empty branch contributes no bytes.

use std::fmt;

use anyhow::{Result, ensure};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use once_cell::sync::Lazy;
use primitive_types::H256;
use serde::{Deserialize, Serialize};

type Blake2b256 = Blake2b<U32>;

/// Root hash of an empty trie.
pub static EMPTY_ROOT_HASH: Lazy<NodeHash> = Lazy::new(|| NodeHash::digest(&[]));

/// A 32-byte BLAKE2b-256 digest addressing a node in the store.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeHash([u8; NodeHash::LEN]);

impl NodeHash {
    /// Length of the digest in bytes.
    pub const LEN: usize = 32;

    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        NodeHash(bytes)
    }

    /// Digest of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(data);
        NodeHash(hasher.finalize().into())
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() == Self::LEN,
            "digest length mismatch: expected {}, got {}",
            Self::LEN,
            bytes.len()
        );
        let mut out = [0u8; Self::LEN];
        out.copy_from_slice(bytes);
        Ok(NodeHash(out))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// The all-zero digest, standing in for an empty branch slot on the wire.
    pub const fn zero() -> Self {
        NodeHash([0u8; Self::LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; Self::LEN]
    }

    /// Leading bytes of the digest in hex, for error contexts and logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    #[cfg(any(test, feature = "fuzzing"))]
    pub fn random() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; Self::LEN];
        rand::thread_rng().fill(&mut bytes[..]);
        NodeHash(bytes)
    }
}

impl From<H256> for NodeHash {
    fn from(hash: H256) -> Self {
        NodeHash(hash.0)
    }
}

impl From<NodeHash> for H256 {
    fn from(hash: NodeHash) -> Self {
        H256(hash.0)
    }
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash(0x{})", hex::encode(self.0))
    }
}
