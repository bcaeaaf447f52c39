//! Chain store: segments + index + manifest, with reorg undo.
//!
//! Writes funnel through the persistence actor; this type assumes a single
//! writer. Every block append is one segment write (fsynced) plus one
//! atomic index batch plus a manifest update. An I/O failure is retried
//! once; a second failure is fatal and the caller must halt block
//! application on the last good state.

use crate::errors::StorageError;
use crate::index::{BatchOp, KeyPrefix, KeyValueStore};
use crate::segment::SegmentStore;
use serde::{Deserialize, Serialize};
use shared_types::codec::{decode_block, encode_block};
use shared_types::{Account, Address, Amount, Block, Contract, Hash};
use shared_crypto::tx_hash;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Stable location of a block body inside the segment set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub segment: u32,
    pub offset: u64,
    pub length: u32,
}

/// Best-chain tip as persisted in the manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTip {
    pub hash: Hash,
    pub height: u64,
    /// Cumulative work, big-endian 256-bit.
    pub work_be: [u8; 32],
}

/// Reverse deltas for one applied block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub height: u64,
    pub block_hash: Hash,
    /// Account values before the block (None: account did not exist).
    pub accounts: Vec<(Address, Option<Account>)>,
    /// Contract values before the block (None: contract did not exist).
    pub contracts: Vec<(Hash, Option<Contract>)>,
    /// Total issued supply before the block.
    pub issued_before: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Manifest {
    tip: Option<StoredTip>,
    genesis: Option<Hash>,
    segment_count: u32,
}

/// The persistent chain state.
pub struct ChainStore<KV: KeyValueStore> {
    kv: KV,
    segments: SegmentStore,
    chainstate_dir: PathBuf,
}

impl<KV: KeyValueStore> ChainStore<KV> {
    pub fn open(data_dir: &Path, kv: KV, segment_max: u64) -> Result<Self, StorageError> {
        let chainstate_dir = data_dir.join("chainstate");
        std::fs::create_dir_all(&chainstate_dir)?;
        let segments = SegmentStore::open(data_dir, segment_max)?;

        let store = Self {
            kv,
            segments,
            chainstate_dir,
        };
        if !store.current_file_ok() {
            store.write_current()?;
        }
        Ok(store)
    }

    // -------------------------------------------------------------------------
    // APPEND
    // -------------------------------------------------------------------------

    /// Persist one applied block with its undo record and the state rows it
    /// touched. One retry on I/O failure, then fatal.
    #[allow(clippy::too_many_arguments)]
    pub fn append_block(
        &mut self,
        block: &Block,
        block_hash: Hash,
        undo: &UndoRecord,
        touched_accounts: &[(Address, Account)],
        touched_contracts: &[(Hash, Contract)],
        issued: Amount,
        tip: StoredTip,
    ) -> Result<BlockLocation, StorageError> {
        let body = encode_block(block);

        let location = match self.segments.append(&body) {
            Ok((segment, offset, length)) => BlockLocation {
                segment,
                offset,
                length,
            },
            Err(first) => {
                warn!(error = %first, "segment append failed, retrying once");
                match self.segments.append(&body) {
                    Ok((segment, offset, length)) => BlockLocation {
                        segment,
                        offset,
                        length,
                    },
                    Err(second) => {
                        error!(error = %second, "segment append failed twice, halting");
                        return Err(StorageError::Fatal {
                            detail: second.to_string(),
                        });
                    }
                }
            }
        };

        self.index_block(
            block,
            block_hash,
            location,
            undo,
            touched_accounts,
            touched_contracts,
            issued,
            tip,
        )?;
        self.log_line(&format!(
            "append height={} hash={:02x}{:02x}..",
            block.header.height, block_hash[0], block_hash[1]
        ));
        Ok(location)
    }

    /// Rebuild the index rows for a block already present in the segments
    /// (startup replay after a manifest inconsistency).
    #[allow(clippy::too_many_arguments)]
    pub fn reindex_block(
        &mut self,
        block: &Block,
        block_hash: Hash,
        location: BlockLocation,
        undo: &UndoRecord,
        touched_accounts: &[(Address, Account)],
        touched_contracts: &[(Hash, Contract)],
        issued: Amount,
        tip: StoredTip,
    ) -> Result<(), StorageError> {
        self.index_block(
            block,
            block_hash,
            location,
            undo,
            touched_accounts,
            touched_contracts,
            issued,
            tip,
        )?;
        self.log_line(&format!("reindex height={}", block.header.height));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn index_block(
        &mut self,
        block: &Block,
        block_hash: Hash,
        location: BlockLocation,
        undo: &UndoRecord,
        touched_accounts: &[(Address, Account)],
        touched_contracts: &[(Hash, Contract)],
        issued: Amount,
        tip: StoredTip,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::with_capacity(
            4 + block.transactions.len() + touched_accounts.len() + touched_contracts.len(),
        );
        ops.push(BatchOp::put(
            KeyPrefix::block_key(&block_hash),
            bincode::serialize(&(location, block.header.height))?,
        ));
        ops.push(BatchOp::put(
            KeyPrefix::height_key(block.header.height),
            block_hash.to_vec(),
        ));
        ops.push(BatchOp::put(
            KeyPrefix::undo_key(block.header.height),
            bincode::serialize(undo)?,
        ));
        for (index, tx) in block.transactions.iter().enumerate() {
            ops.push(BatchOp::put(
                KeyPrefix::tx_key(&tx_hash(tx)),
                bincode::serialize(&(block_hash, index as u32))?,
            ));
        }
        for (address, account) in touched_accounts {
            ops.push(BatchOp::put(
                KeyPrefix::account_key(address),
                bincode::serialize(account)?,
            ));
        }
        for (id, contract) in touched_contracts {
            ops.push(BatchOp::put(
                KeyPrefix::contract_key(id),
                bincode::serialize(contract)?,
            ));
        }
        ops.push(BatchOp::put(
            KeyPrefix::meta_key(b"issued"),
            bincode::serialize(&issued)?,
        ));
        self.kv.write_batch(ops)?;
        self.write_manifest(Some(tip))
    }

    // -------------------------------------------------------------------------
    // LOOKUPS
    // -------------------------------------------------------------------------

    pub fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        let Some(raw) = self.kv.get(&KeyPrefix::block_key(hash))? else {
            return Ok(None);
        };
        let (location, height): (BlockLocation, u64) = bincode::deserialize(&raw)?;
        let body = self
            .segments
            .read(location.segment, location.offset, location.length)?;
        let mut block = decode_block(&body).map_err(|e| StorageError::IndexCorruption {
            detail: format!("stored block undecodable: {e}"),
        })?;
        block.header.height = height;
        Ok(Some(block))
    }

    pub fn hash_at_height(&self, height: u64) -> Result<Option<Hash>, StorageError> {
        let Some(raw) = self.kv.get(&KeyPrefix::height_key(height))? else {
            return Ok(None);
        };
        raw.try_into()
            .map(Some)
            .map_err(|_| StorageError::IndexCorruption {
                detail: "height row is not a 32-byte hash".into(),
            })
    }

    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, StorageError> {
        match self.hash_at_height(height)? {
            Some(hash) => self.block_by_hash(&hash),
            None => Ok(None),
        }
    }

    /// (containing block hash, index within block).
    pub fn tx_location(&self, hash: &Hash) -> Result<Option<(Hash, u32)>, StorageError> {
        let Some(raw) = self.kv.get(&KeyPrefix::tx_key(hash))? else {
            return Ok(None);
        };
        Ok(Some(bincode::deserialize(&raw)?))
    }

    pub fn undo_record(&self, height: u64) -> Result<Option<UndoRecord>, StorageError> {
        let Some(raw) = self.kv.get(&KeyPrefix::undo_key(height))? else {
            return Ok(None);
        };
        Ok(Some(bincode::deserialize(&raw)?))
    }

    pub fn load_accounts(&self) -> Result<Vec<(Address, Account)>, StorageError> {
        let rows = self.kv.scan_prefix(KeyPrefix::ACCOUNT)?;
        let mut accounts = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            let address: Address = key[KeyPrefix::ACCOUNT.len()..]
                .try_into()
                .map_err(|_| StorageError::IndexCorruption {
                    detail: "account key malformed".into(),
                })?;
            accounts.push((address, bincode::deserialize(&value)?));
        }
        Ok(accounts)
    }

    pub fn load_contracts(&self) -> Result<Vec<(Hash, Contract)>, StorageError> {
        let rows = self.kv.scan_prefix(KeyPrefix::CONTRACT)?;
        let mut contracts = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            let id: Hash = key[KeyPrefix::CONTRACT.len()..].try_into().map_err(|_| {
                StorageError::IndexCorruption {
                    detail: "contract key malformed".into(),
                }
            })?;
            contracts.push((id, bincode::deserialize(&value)?));
        }
        Ok(contracts)
    }

    pub fn issued(&self) -> Result<Amount, StorageError> {
        match self.kv.get(&KeyPrefix::meta_key(b"issued"))? {
            Some(raw) => Ok(bincode::deserialize(&raw)?),
            None => Ok(Amount::ZERO),
        }
    }

    pub fn genesis_hash(&self) -> Result<Option<Hash>, StorageError> {
        Ok(self.read_manifest()?.genesis)
    }

    pub fn set_genesis(&mut self, hash: Hash) -> Result<(), StorageError> {
        let mut manifest = self.read_manifest()?;
        manifest.genesis = Some(hash);
        self.persist_manifest(&manifest)
    }

    pub fn tip(&self) -> Result<Option<StoredTip>, StorageError> {
        Ok(self.read_manifest()?.tip)
    }

    // -------------------------------------------------------------------------
    // REORG
    // -------------------------------------------------------------------------

    /// Remove the best-chain suffix above `new_height`, returning the undo
    /// records deepest-last so the caller can restore state newest-first.
    pub fn rollback_to(
        &mut self,
        new_height: u64,
        new_tip: StoredTip,
        window: u64,
    ) -> Result<Vec<UndoRecord>, StorageError> {
        let Some(current) = self.tip()? else {
            return Ok(Vec::new());
        };
        let depth = current.height.saturating_sub(new_height);
        if depth > window {
            return Err(StorageError::ReorgBeyondWindow { depth, window });
        }

        let mut undone = Vec::new();
        let mut ops = Vec::new();
        for height in ((new_height + 1)..=current.height).rev() {
            let record = self
                .undo_record(height)?
                .ok_or_else(|| StorageError::IndexCorruption {
                    detail: format!("missing undo record at height {height}"),
                })?;
            ops.push(BatchOp::delete(KeyPrefix::height_key(height)));
            ops.push(BatchOp::delete(KeyPrefix::undo_key(height)));
            undone.push(record);
        }
        self.kv.write_batch(ops)?;
        self.write_manifest(Some(new_tip))?;
        self.log_line(&format!(
            "rollback from={} to={} depth={}",
            current.height, new_height, depth
        ));
        Ok(undone)
    }

    /// Rewrite state rows after the caller applied undo records.
    pub fn persist_state_rows(
        &mut self,
        accounts: &[(Address, Option<Account>)],
        contracts: &[(Hash, Option<Contract>)],
        issued: Amount,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::with_capacity(accounts.len() + contracts.len() + 1);
        for (address, account) in accounts {
            match account {
                Some(account) => ops.push(BatchOp::put(
                    KeyPrefix::account_key(address),
                    bincode::serialize(account)?,
                )),
                None => ops.push(BatchOp::delete(KeyPrefix::account_key(address))),
            }
        }
        for (id, contract) in contracts {
            match contract {
                Some(contract) => ops.push(BatchOp::put(
                    KeyPrefix::contract_key(id),
                    bincode::serialize(contract)?,
                )),
                None => ops.push(BatchOp::delete(KeyPrefix::contract_key(id))),
            }
        }
        ops.push(BatchOp::put(
            KeyPrefix::meta_key(b"issued"),
            bincode::serialize(&issued)?,
        ));
        self.kv.write_batch(ops)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // STARTUP
    // -------------------------------------------------------------------------

    /// Manifest consistency: the recorded tip must resolve in the index.
    pub fn is_consistent(&self) -> bool {
        match self.read_manifest() {
            Ok(manifest) => match manifest.tip {
                Some(tip) => matches!(
                    self.kv.get(&KeyPrefix::block_key(&tip.hash)),
                    Ok(Some(_))
                ),
                None => true,
            },
            Err(_) => false,
        }
    }

    /// Raw bodies of every stored block in write order, for replay when the
    /// manifest is inconsistent.
    pub fn replay_bodies(&self) -> Result<Vec<Block>, StorageError> {
        Ok(self
            .replay_records()?
            .into_iter()
            .map(|(_, block)| block)
            .collect())
    }

    /// Decoded blocks with their stable locations, in write order.
    pub fn replay_records(&self) -> Result<Vec<(BlockLocation, Block)>, StorageError> {
        let mut records = Vec::new();
        for (segment, offset, length, body) in self.segments.replay_with_locations()? {
            let block = decode_block(&body).map_err(|e| StorageError::IndexCorruption {
                detail: format!("segment replay hit undecodable block: {e}"),
            })?;
            records.push((
                BlockLocation {
                    segment,
                    offset,
                    length,
                },
                block,
            ));
        }
        Ok(records)
    }

    // -------------------------------------------------------------------------
    // MANIFEST / CURRENT / LOG
    // -------------------------------------------------------------------------

    fn manifest_path(&self) -> PathBuf {
        self.chainstate_dir.join("MANIFEST")
    }

    fn read_manifest(&self) -> Result<Manifest, StorageError> {
        match std::fs::read(self.manifest_path()) {
            Ok(raw) => Ok(bincode::deserialize(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest {
                tip: None,
                genesis: None,
                segment_count: 0,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn write_manifest(&self, tip: Option<StoredTip>) -> Result<(), StorageError> {
        let mut manifest = self.read_manifest()?;
        manifest.tip = tip;
        manifest.segment_count = self.segments.current_segment() + 1;
        self.persist_manifest(&manifest)
    }

    fn persist_manifest(&self, manifest: &Manifest) -> Result<(), StorageError> {
        let tmp = self.chainstate_dir.join("MANIFEST.tmp");
        std::fs::write(&tmp, bincode::serialize(manifest)?)?;
        std::fs::rename(&tmp, self.manifest_path())?;
        Ok(())
    }

    fn current_file_ok(&self) -> bool {
        std::fs::read_to_string(self.chainstate_dir.join("CURRENT"))
            .map(|s| s.trim() == "MANIFEST")
            .unwrap_or(false)
    }

    fn write_current(&self) -> Result<(), StorageError> {
        std::fs::write(self.chainstate_dir.join("CURRENT"), "MANIFEST\n")?;
        Ok(())
    }

    fn log_line(&self, line: &str) {
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.chainstate_dir.join("LOG"))
        {
            let _ = writeln!(file, "{line}");
        }
    }
}

impl<KV: KeyValueStore> ChainStore<KV> {
    pub fn kv(&self) -> &KV {
        &self.kv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryKv;
    use shared_types::{ChainMode, PROTOCOL_VERSION};
    use shared_types::entities::BlockHeader;
    use tempfile::TempDir;

    fn test_block(height: u64, parent_hash: Hash) -> (Block, Hash) {
        let block = Block {
            header: BlockHeader {
                version: PROTOCOL_VERSION,
                height,
                parent_hash,
                merkle_root: [0u8; 32],
                timestamp: height as f64 * 30.0,
                difficulty: 1,
                nonce: height,
                miner: [0x33; 23],
                mode: ChainMode::OnGrid,
            },
            attestations: Vec::new(),
            transactions: Vec::new(),
        };
        let hash = shared_crypto::block_hash(&block.header);
        (block, hash)
    }

    fn tip_for(hash: Hash, height: u64) -> StoredTip {
        StoredTip {
            hash,
            height,
            work_be: [0u8; 32],
        }
    }

    fn undo_for(height: u64, hash: Hash) -> UndoRecord {
        UndoRecord {
            height,
            block_hash: hash,
            accounts: Vec::new(),
            contracts: Vec::new(),
            issued_before: Amount::ZERO,
        }
    }

    fn open_store(dir: &TempDir) -> ChainStore<MemoryKv> {
        ChainStore::open(dir.path(), MemoryKv::new(), 1024 * 1024).unwrap()
    }

    fn append(store: &mut ChainStore<MemoryKv>, height: u64, parent: Hash) -> Hash {
        let (block, hash) = test_block(height, parent);
        store
            .append_block(
                &block,
                hash,
                &undo_for(height, hash),
                &[],
                &[],
                Amount::units(50 * height),
                tip_for(hash, height),
            )
            .unwrap();
        hash
    }

    #[test]
    fn test_append_and_lookup() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let h0 = append(&mut store, 0, [0u8; 32]);
        let h1 = append(&mut store, 1, h0);

        let block = store.block_by_hash(&h1).unwrap().unwrap();
        assert_eq!(block.header.height, 1);
        assert_eq!(store.hash_at_height(0).unwrap(), Some(h0));
        assert_eq!(store.block_by_height(1).unwrap().unwrap().header.parent_hash, h0);
        assert_eq!(store.tip().unwrap().unwrap().height, 1);
        assert_eq!(store.issued().unwrap(), Amount::units(50));
    }

    #[test]
    fn test_layout_files_exist() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        append(&mut store, 0, [0u8; 32]);

        assert!(dir.path().join("blocks/blk00000.dat").exists());
        assert!(dir.path().join("chainstate/CURRENT").exists());
        assert!(dir.path().join("chainstate/MANIFEST").exists());
        assert!(dir.path().join("chainstate/LOG").exists());
    }

    #[test]
    fn test_rollback_within_window() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let h0 = append(&mut store, 0, [0u8; 32]);
        let h1 = append(&mut store, 1, h0);
        let _h2 = append(&mut store, 2, h1);

        let undone = store
            .rollback_to(0, tip_for(h0, 0), 6)
            .unwrap();
        assert_eq!(undone.len(), 2);
        // Newest first for state restoration.
        assert_eq!(undone[0].height, 2);
        assert_eq!(undone[1].height, 1);
        assert_eq!(store.hash_at_height(1).unwrap(), None);
        assert_eq!(store.tip().unwrap().unwrap().height, 0);
    }

    #[test]
    fn test_rollback_beyond_window_refused() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let mut parent = [0u8; 32];
        for height in 0..10 {
            parent = append(&mut store, height, parent);
        }
        let genesis = store.hash_at_height(0).unwrap().unwrap();
        let err = store.rollback_to(0, tip_for(genesis, 0), 6).unwrap_err();
        assert!(matches!(err, StorageError::ReorgBeyondWindow { depth: 9, .. }));
    }

    #[test]
    fn test_consistency_and_replay() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let h0 = append(&mut store, 0, [0u8; 32]);
        append(&mut store, 1, h0);
        assert!(store.is_consistent());

        // Fresh index over the same segments: manifest points at a block the
        // index does not know, so the store reports inconsistency and replay
        // returns both bodies.
        let broken = ChainStore::open(dir.path(), MemoryKv::new(), 1024 * 1024).unwrap();
        assert!(!broken.is_consistent());
        assert_eq!(broken.replay_bodies().unwrap().len(), 2);
    }

    #[test]
    fn test_tx_index_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let (mut block, _) = test_block(0, [0u8; 32]);
        block.transactions.push(shared_types::Transaction {
            version: PROTOCOL_VERSION,
            tx_type: shared_types::TxType::MiningReward,
            from: None,
            to: Some([0x33; 23]),
            amount: Amount::units(50),
            nonce: 0,
            fee: Amount::ZERO,
            timestamp: 0.0,
            sender_pubkey: Vec::new(),
            payload: Vec::new(),
            signature: [0u8; 64],
        });
        let hash = shared_crypto::block_hash(&block.header);
        store
            .append_block(
                &block,
                hash,
                &undo_for(0, hash),
                &[],
                &[],
                Amount::units(50),
                tip_for(hash, 0),
            )
            .unwrap();

        let txid = tx_hash(&block.transactions[0]);
        assert_eq!(store.tx_location(&txid).unwrap(), Some((hash, 0)));
    }
}
