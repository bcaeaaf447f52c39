//! Key-value index abstraction.
//!
//! The chain index (block locations, best-chain heights, transaction
//! locations, account state, contract state, grid cells, undo records)
//! lives behind [`KeyValueStore`]. Tests use [`MemoryKv`]; the node runtime
//! plugs in rocksdb.

use crate::errors::StorageError;
use shared_types::Hash;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// One mutation inside an atomic batch.
#[derive(Clone, Debug)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        BatchOp::Put { key, value }
    }

    pub fn delete(key: Vec<u8>) -> Self {
        BatchOp::Delete { key }
    }
}

/// Single-writer key-value store with consistent reads.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Apply a batch atomically: all mutations or none.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError>;

    /// All (key, value) pairs under a prefix, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}

/// Key namespace, one prefix byte pair per column.
pub struct KeyPrefix;

impl KeyPrefix {
    pub const BLOCK: &'static [u8] = b"b:";
    pub const HEIGHT: &'static [u8] = b"h:";
    pub const TX: &'static [u8] = b"t:";
    pub const ACCOUNT: &'static [u8] = b"a:";
    pub const CONTRACT: &'static [u8] = b"c:";
    pub const CELL: &'static [u8] = b"g:";
    pub const UNDO: &'static [u8] = b"u:";
    pub const META: &'static [u8] = b"m:";

    pub fn block_key(hash: &Hash) -> Vec<u8> {
        [Self::BLOCK, hash.as_slice()].concat()
    }

    pub fn height_key(height: u64) -> Vec<u8> {
        [Self::HEIGHT, height.to_be_bytes().as_slice()].concat()
    }

    pub fn tx_key(hash: &Hash) -> Vec<u8> {
        [Self::TX, hash.as_slice()].concat()
    }

    pub fn account_key(address: &[u8]) -> Vec<u8> {
        [Self::ACCOUNT, address].concat()
    }

    pub fn contract_key(id: &Hash) -> Vec<u8> {
        [Self::CONTRACT, id.as_slice()].concat()
    }

    pub fn undo_key(height: u64) -> Vec<u8> {
        [Self::UNDO, height.to_be_bytes().as_slice()].concat()
    }

    pub fn meta_key(name: &[u8]) -> Vec<u8> {
        [Self::META, name].concat()
    }
}

/// In-memory store for tests and tools.
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let map = self.map.read().map_err(poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let mut map = self.map.write().map_err(poisoned)?;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let map = self.map.read().map_err(poisoned)?;
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::IndexCorruption {
        detail: "index lock poisoned".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_put_get_delete() {
        let kv = MemoryKv::new();
        kv.write_batch(vec![
            BatchOp::put(b"a:1".to_vec(), vec![1]),
            BatchOp::put(b"a:2".to_vec(), vec![2]),
        ])
        .unwrap();
        assert_eq!(kv.get(b"a:1").unwrap(), Some(vec![1]));

        kv.write_batch(vec![BatchOp::delete(b"a:1".to_vec())]).unwrap();
        assert_eq!(kv.get(b"a:1").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_ordered() {
        let kv = MemoryKv::new();
        kv.write_batch(vec![
            BatchOp::put(KeyPrefix::height_key(2), vec![2]),
            BatchOp::put(KeyPrefix::height_key(1), vec![1]),
            BatchOp::put(KeyPrefix::meta_key(b"tip"), vec![9]),
        ])
        .unwrap();

        let rows = kv.scan_prefix(KeyPrefix::HEIGHT).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, vec![1]);
        assert_eq!(rows[1].1, vec![2]);
    }

    #[test]
    fn test_big_endian_heights_sort_numerically() {
        let kv = MemoryKv::new();
        for height in [1u64, 10, 2, 256] {
            kv.write_batch(vec![BatchOp::put(
                KeyPrefix::height_key(height),
                height.to_le_bytes().to_vec(),
            )])
            .unwrap();
        }
        let rows = kv.scan_prefix(KeyPrefix::HEIGHT).unwrap();
        let heights: Vec<u64> = rows
            .iter()
            .map(|(_, v)| u64::from_le_bytes(v.as_slice().try_into().unwrap()))
            .collect();
        assert_eq!(heights, vec![1, 2, 10, 256]);
    }
}
