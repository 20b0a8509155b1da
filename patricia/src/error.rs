// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

use raw_kv::StoreError;
use thiserror::Error;

/// Semantic failure kinds surfaced by the trie.
///
/// Errors propagate as [`anyhow::Error`] chains carrying one of these roots;
/// callers recover the kind with `downcast_ref::<TrieError>()`. A mutation
/// that fails mid-ascent may leave the in-memory root out of sync with the
/// persisted spine, so callers should treat any mutation error as fatal for
/// the handle.
#[derive(Debug, Error)]
pub enum TrieError {
    /// The operation violates a trie-level invariant: duplicate insert,
    /// missing key on get/update/delete, or entry-count underflow.
    #[error("invalid trie operation")]
    InvalidTrie,

    /// A node or traversal frame is not what the structure says it must be.
    /// Indicates store corruption or an engine bug.
    #[error("invalid patricia node")]
    InvalidPatricia,

    /// The node store failed; `hash` is the prefix of the offending node key.
    #[error("node {hash}: {source}")]
    Store {
        hash: String,
        #[source]
        source: StoreError,
    },
}
