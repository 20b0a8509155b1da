// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Bucketed key–value storage behind the trie core.
//!
//! The trie addresses its nodes by content hash and only ever needs four
//! operations over a named bucket, plus a stop lifecycle. [`KVStore`] is that
//! contract; [`RocksStore`] is the durable implementation (one rocksdb column
//! family per bucket) and [`MemoryStore`] the in-process one used by tests.

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use thiserror::Error;

/// Failures surfaced by a [`KVStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named bucket was not declared when the store was opened.
    #[error("bucket {0} does not exist")]
    UnknownBucket(String),

    /// `put_if_not_exists` found the key already present.
    #[error("key 0x{0} already exists")]
    KeyExists(String),

    /// Any error bubbling up from the rocksdb backend.
    #[error(transparent)]
    Backend(#[from] rocksdb::Error),
}

/// Minimum contract the trie core requires of its backing store.
///
/// Buckets are fixed at open time. `put` is an idempotent overwrite while
/// `put_if_not_exists` fails with [`StoreError::KeyExists`] when the key is
/// present; `delete` of an absent key is a no-op. Durability is the store's
/// concern, not the caller's.
pub trait KVStore {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn put_if_not_exists(&self, bucket: &str, key: &[u8], value: &[u8])
    -> Result<(), StoreError>;

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), StoreError>;

    /// Releases the backing resources. Must be called exactly once.
    fn close(&self) -> Result<(), StoreError>;
}
