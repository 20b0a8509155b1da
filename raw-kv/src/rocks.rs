// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use tracing::debug;

use crate::{KVStore, StoreError};

/// Durable [`KVStore`] over rocksdb, one column family per bucket.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Opens (or creates) the database at `path` with the given buckets.
    pub fn open<P: AsRef<Path>>(path: P, buckets: &[&str]) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let cfs = buckets
            .iter()
            .map(|bucket| ColumnFamilyDescriptor::new(*bucket, Options::default()))
            .collect::<Vec<_>>();

        debug!(path = %path.as_ref().display(), buckets = buckets.len(), "opening rocksdb store");
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(RocksStore { db })
    }

    fn cf(&self, bucket: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(bucket)
            .ok_or_else(|| StoreError::UnknownBucket(bucket.to_string()))
    }
}

impl KVStore for RocksStore {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get_cf(self.cf(bucket)?, key)?)
    }

    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        Ok(self.db.put_cf(self.cf(bucket)?, key, value)?)
    }

    fn put_if_not_exists(
        &self,
        bucket: &str,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StoreError> {
        // The trie engine is single-writer, so check-then-put is race-free.
        if self.db.get_pinned_cf(self.cf(bucket)?, key)?.is_some() {
            return Err(StoreError::KeyExists(hex::encode(key)));
        }
        self.put(bucket, key, value)
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), StoreError> {
        Ok(self.db.delete_cf(self.cf(bucket)?, key)?)
    }

    fn close(&self) -> Result<(), StoreError> {
        debug!("flushing rocksdb store");
        Ok(self.db.flush()?)
    }
}
