//! Persistent state of the node.
//!
//! The storage engine is treated as an opaque ordered key-value store behind
//! the [`Store`] trait, with a RocksDB backend for production and an
//! in-memory backend for tests. On top of it sit the typed records of the
//! ledger schema and the two mutation paths: genesis creation and atomic
//! block application.

pub mod keys;
mod ledger;
mod records;
mod store;
mod validation;

pub use ledger::{apply_block, latest_height, make_genesis, LedgerError};
pub use records::{
    batch_block, batch_block_operation, batch_block_transaction, delete_pooled_transaction,
    delete_transaction_history, exists_account, exists_block_transaction,
    exists_transaction_history, get_account, get_account_snapshot, get_block, get_block_bytes,
    get_block_height, get_block_transaction, get_transaction_history, latest_block,
    latest_operation_by_source, save_account, save_account_snapshot, save_pooled_transaction,
    save_transaction_history, BlockOperation, BlockTransaction, HistoryStatus, TransactionHistory,
};
pub use store::{Batch, Direction, MemoryStore, RocksDbStore, StorageError, Store};
pub use validation::{validate_op, validate_tx, ValidationError};
