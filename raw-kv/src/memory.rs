// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::RwLock;

use crate::{KVStore, StoreError};

/// In-process [`KVStore`] with the same bucket semantics as [`RocksStore`].
///
/// Buckets spring into existence on first write, which keeps test setup to a
/// single constructor call.
///
/// [`RocksStore`]: crate::RocksStore
#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held under `bucket`.
    pub fn len(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .get(bucket)
            .map(|b| b.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }
}

impl KVStore for MemoryStore {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key).cloned()))
    }

    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_if_not_exists(
        &self,
        bucket: &str,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StoreError> {
        let mut buckets = self.buckets.write();
        match buckets
            .entry(bucket.to_string())
            .or_default()
            .entry(key.to_vec())
        {
            Entry::Occupied(_) => Err(StoreError::KeyExists(hex::encode(key))),
            Entry::Vacant(slot) => {
                slot.insert(value.to_vec());
                Ok(())
            }
        }
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), StoreError> {
        if let Some(b) = self.buckets.write().get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
