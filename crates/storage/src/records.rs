//! Typed persistence over the raw store.

use crate::{keys, Batch, Direction, StorageError, Store};
use isaac_types::{
    Account, AccountSnapshot, Address, Amount, Block, Hash, Operation, OperationKind, Transaction,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

fn get_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>, StorageError> {
    match store.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn put_json<T: Serialize>(store: &dyn Store, key: &str, value: &T) -> Result<(), StorageError> {
    store.put(key.as_bytes(), &serde_json::to_vec(value)?)
}

// ── Accounts ────────────────────────────────────────────────────────────────

pub fn get_account(store: &dyn Store, address: &Address) -> Result<Option<Account>, StorageError> {
    get_json(store, &keys::account(address))
}

pub fn exists_account(store: &dyn Store, address: &Address) -> Result<bool, StorageError> {
    store.has(keys::account(address).as_bytes())
}

pub fn save_account(store: &dyn Store, account: &Account) -> Result<(), StorageError> {
    put_json(store, &keys::account(&account.address), account)
}

pub fn get_account_snapshot(
    store: &dyn Store,
    address: &Address,
    sequence_id: u64,
) -> Result<Option<AccountSnapshot>, StorageError> {
    get_json(store, &keys::account_snapshot(address, sequence_id))
}

pub fn save_account_snapshot(
    store: &dyn Store,
    snapshot: &AccountSnapshot,
) -> Result<(), StorageError> {
    put_json(
        store,
        &keys::account_snapshot(&snapshot.address, snapshot.sequence_id),
        snapshot,
    )
}

// ── Block transactions ──────────────────────────────────────────────────────

/// A transaction as persisted inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub hash: Hash,
    pub block_height: u64,
    pub transaction: Transaction,
}

pub fn exists_block_transaction(store: &dyn Store, hash: &Hash) -> Result<bool, StorageError> {
    store.has(keys::block_transaction(hash).as_bytes())
}

pub fn get_block_transaction(
    store: &dyn Store,
    hash: &Hash,
) -> Result<Option<BlockTransaction>, StorageError> {
    get_json(store, &keys::block_transaction(hash))
}

/// Write a block transaction record and both secondary indices into `batch`.
pub fn batch_block_transaction(
    batch: &mut Batch,
    record: &BlockTransaction,
) -> Result<(), StorageError> {
    batch.put_json(keys::block_transaction(&record.hash), record)?;
    batch.put_json(
        keys::block_transaction_source(
            record.transaction.source(),
            record.block_height,
            &record.hash,
        ),
        &record.hash,
    )?;
    batch.put_json(
        keys::block_transaction_height(record.block_height, &record.hash),
        &record.hash,
    )?;
    Ok(())
}

// ── Transaction history ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Submitted,
    Confirmed,
    Rejected,
}

/// Marker recording that a transaction hash has been seen, and how far it got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHistory {
    pub hash: Hash,
    pub status: HistoryStatus,
    /// Milliseconds since the Unix epoch at first submission. Preserved
    /// across status updates.
    pub submitted_at: u64,
}

pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn exists_transaction_history(store: &dyn Store, hash: &Hash) -> Result<bool, StorageError> {
    store.has(keys::transaction_history(hash).as_bytes())
}

pub fn get_transaction_history(
    store: &dyn Store,
    hash: &Hash,
) -> Result<Option<TransactionHistory>, StorageError> {
    get_json(store, &keys::transaction_history(hash))
}

/// Upsert the history marker. A fresh marker is stamped with the current
/// time; a status update keeps the original submission time.
pub fn save_transaction_history(
    store: &dyn Store,
    hash: &Hash,
    status: HistoryStatus,
) -> Result<(), StorageError> {
    let submitted_at = get_transaction_history(store, hash)?
        .map(|existing| existing.submitted_at)
        .unwrap_or_else(unix_millis);
    put_json(
        store,
        &keys::transaction_history(hash),
        &TransactionHistory {
            hash: *hash,
            status,
            submitted_at,
        },
    )
}

/// Drop the history marker so the transaction may be submitted again.
pub fn delete_transaction_history(store: &dyn Store, hash: &Hash) -> Result<(), StorageError> {
    store.delete(keys::transaction_history(hash).as_bytes())
}

// ── Block operations ────────────────────────────────────────────────────────

/// One operation as persisted, with enough metadata for history queries.
/// The frozen-account rules read these through the source index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOperation {
    pub kind: OperationKind,
    pub source: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Address>,
    pub amount: Amount,
    pub tx_hash: Hash,
    pub block_height: u64,
}

impl BlockOperation {
    pub fn from_operation(op: &Operation, source: &Address, tx_hash: Hash, height: u64) -> Self {
        Self {
            kind: op.kind(),
            source: source.clone(),
            target: op.target().cloned(),
            amount: op.amount(),
            tx_hash,
            block_height: height,
        }
    }
}

/// Write a block operation and its source index into `batch`.
pub fn batch_block_operation(
    batch: &mut Batch,
    record: &BlockOperation,
    index: usize,
) -> Result<(), StorageError> {
    batch.put_json(keys::block_operation(&record.tx_hash, index), record)?;
    batch.put_json(
        keys::block_operation_source(
            &record.source,
            record.block_height,
            &record.tx_hash,
            index,
        ),
        record,
    )?;
    Ok(())
}

/// The most recent persisted operation whose source is `address`, if any.
pub fn latest_operation_by_source(
    store: &dyn Store,
    address: &Address,
) -> Result<Option<BlockOperation>, StorageError> {
    let prefix = keys::block_operation_source_prefix(address);
    let items = store.iter_prefix(prefix.as_bytes(), Direction::Reverse)?;
    match items.first() {
        Some((_, bytes)) => Ok(Some(serde_json::from_slice(bytes)?)),
        None => Ok(None),
    }
}

// ── Blocks ──────────────────────────────────────────────────────────────────

pub fn get_block(store: &dyn Store, height: u64) -> Result<Option<Block>, StorageError> {
    get_json(store, &keys::block(height))
}

pub fn get_block_height(store: &dyn Store, hash: &Hash) -> Result<Option<u64>, StorageError> {
    get_json(store, &keys::block_height(hash))
}

/// The raw stored bytes of a block, for peers fetching it during sync.
pub fn get_block_bytes(store: &dyn Store, height: u64) -> Result<Option<Vec<u8>>, StorageError> {
    store.get(keys::block(height).as_bytes())
}

pub fn batch_block(batch: &mut Batch, block: &Block) -> Result<(), StorageError> {
    batch.put_json(keys::block(block.height), block)?;
    batch.put_json(keys::block_height(&block.hash), &block.height)?;
    Ok(())
}

/// The highest persisted block, if the chain has one.
pub fn latest_block(store: &dyn Store) -> Result<Option<Block>, StorageError> {
    let items = store.iter_prefix(keys::BLOCK_PREFIX.as_bytes(), Direction::Reverse)?;
    match items.first() {
        Some((_, bytes)) => Ok(Some(serde_json::from_slice(bytes)?)),
        None => Ok(None),
    }
}

// ── Pooled transactions ─────────────────────────────────────────────────────

pub fn save_pooled_transaction(store: &dyn Store, tx: &Transaction) -> Result<(), StorageError> {
    put_json(store, &keys::pooled_transaction(&tx.hash()), tx)
}

pub fn delete_pooled_transaction(batch: &mut Batch, hash: &Hash) {
    batch.delete(keys::pooled_transaction(hash));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use isaac_types::KeyPair;

    #[test]
    fn account_round_trip() {
        let store = MemoryStore::new();
        let account = Account::new(KeyPair::from_seed([1; 32]).address(), Amount::new(500));
        save_account(&store, &account).unwrap();
        assert!(exists_account(&store, &account.address).unwrap());
        assert_eq!(get_account(&store, &account.address).unwrap(), Some(account));
    }

    #[test]
    fn history_lifecycle() {
        let store = MemoryStore::new();
        let hash = Hash::from_bytes(b"tx");
        assert!(!exists_transaction_history(&store, &hash).unwrap());
        save_transaction_history(&store, &hash, HistoryStatus::Submitted).unwrap();
        let submitted = get_transaction_history(&store, &hash).unwrap().unwrap();
        assert_eq!(submitted.status, HistoryStatus::Submitted);

        save_transaction_history(&store, &hash, HistoryStatus::Confirmed).unwrap();
        let confirmed = get_transaction_history(&store, &hash).unwrap().unwrap();
        assert_eq!(confirmed.status, HistoryStatus::Confirmed);
        // Status updates keep the original submission time.
        assert_eq!(confirmed.submitted_at, submitted.submitted_at);

        delete_transaction_history(&store, &hash).unwrap();
        assert!(!exists_transaction_history(&store, &hash).unwrap());
    }

    #[test]
    fn latest_operation_is_most_recent() {
        let store = MemoryStore::new();
        let source = KeyPair::from_seed([1; 32]).address();
        for height in [3u64, 7, 5] {
            let record = BlockOperation {
                kind: if height == 7 {
                    OperationKind::UnfreezeRequest
                } else {
                    OperationKind::Payment
                },
                source: source.clone(),
                target: None,
                amount: Amount::ZERO,
                tx_hash: Hash::from_bytes(&height.to_le_bytes()),
                block_height: height,
            };
            let mut batch = Batch::new();
            batch_block_operation(&mut batch, &record, 0).unwrap();
            store.write(batch).unwrap();
        }
        let latest = latest_operation_by_source(&store, &source).unwrap().unwrap();
        assert_eq!(latest.block_height, 7);
        assert_eq!(latest.kind, OperationKind::UnfreezeRequest);
    }

    #[test]
    fn latest_block_scans_reverse() {
        let store = MemoryStore::new();
        let proposer = KeyPair::from_seed([2; 32]).address();
        let genesis = Block::genesis(proposer.clone(), "t0".into()).unwrap();
        let second = Block::new(2, genesis.hash, proposer, vec![], None, 0, "t1".into()).unwrap();
        for block in [&genesis, &second] {
            let mut batch = Batch::new();
            batch_block(&mut batch, block).unwrap();
            store.write(batch).unwrap();
        }
        assert_eq!(latest_block(&store).unwrap().unwrap().height, 2);
        assert_eq!(get_block_height(&store, &second.hash).unwrap(), Some(2));
    }
}
