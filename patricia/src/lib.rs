// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! A persistent Merkle Patricia Trie over a content-addressed node store.
//!
//! The trie is an authenticated map from byte-string keys to byte-string
//! values. At any point it exposes a single 32-byte [`NodeHash`] committing to
//! the whole mapping: two tries holding the same entries produce the same
//! root regardless of insertion order, and any change to any entry changes
//! the root.
//!
//! Nodes refer to their children by BLAKE2b-256 digest, never by pointer, and
//! live in a bucketed [`KVStore`](raw_kv::KVStore) keyed by that digest. Each
//! mutation rewrites the root-to-leaf spine: stale serializations are deleted
//! and the rewritten nodes re-persisted bottom-up, so the in-memory root
//! always addresses a spine that exists in storage.
//!
//! ```no_run
//! use patricia::{EMPTY_ROOT_HASH, Trie};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut trie = Trie::new("/tmp/trie-db")?;
//! trie.insert(b"\xca\xfe", b"\x01")?;
//! assert_eq!(trie.get(b"\xca\xfe")?, vec![0x01]);
//! assert_ne!(trie.root_hash(), *EMPTY_ROOT_HASH);
//! trie.close()?;
//! # Ok(())
//! # }
//! ```

mod cursor;
mod error;
mod hash;
mod nibble;
mod node;
mod store;
mod trie;

pub use error::TrieError;
pub use hash::{EMPTY_ROOT_HASH, NodeHash};
pub use node::NodeDecodeError;
pub use trie::{TRIE_BUCKET, Trie};
