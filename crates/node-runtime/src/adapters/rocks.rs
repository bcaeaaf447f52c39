//! RocksDB adapter for the chain index.

use lc_storage::{BatchOp, KeyValueStore, StorageError};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::path::Path;

/// RocksDB-backed [`KeyValueStore`].
pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path).map_err(|e| StorageError::Io {
            detail: e.to_string(),
        })?;
        Ok(Self { db })
    }
}

impl KeyValueStore for RocksKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db.get(key).map_err(|e| StorageError::Io {
            detail: e.to_string(),
        })
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => batch.put(key, value),
                BatchOp::Delete { key } => batch.delete(key),
            }
        }
        self.db.write(batch).map_err(|e| StorageError::Io {
            detail: e.to_string(),
        })
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut rows = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::Io {
                detail: e.to_string(),
            })?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }
}
