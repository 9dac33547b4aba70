//! Key schema.
//!
//! Every record lives under a short string prefix. Numeric key components are
//! zero-padded to 20 digits so lexicographic order equals numeric order.

use isaac_types::{Address, Hash};

/// `ba-<address>` → [`isaac_types::Account`]
pub fn account(address: &Address) -> String {
    format!("ba-{address}")
}

/// `bas-<address>-<seq>` → [`isaac_types::AccountSnapshot`]
pub fn account_snapshot(address: &Address, sequence_id: u64) -> String {
    format!("bas-{address}-{sequence_id:020}")
}

/// `bt-<hash>` → [`crate::BlockTransaction`]
pub fn block_transaction(hash: &Hash) -> String {
    format!("bt-{hash}")
}

/// `bt-src-<address>-<height>-<hash>` → transaction hash (index by source)
pub fn block_transaction_source(address: &Address, height: u64, hash: &Hash) -> String {
    format!("bt-src-{address}-{height:020}-{hash}")
}

/// `bt-height-<height>-<hash>` → transaction hash (index by block height)
pub fn block_transaction_height(height: u64, hash: &Hash) -> String {
    format!("bt-height-{height:020}-{hash}")
}

/// `bth-<hash>` → [`crate::TransactionHistory`]
pub fn transaction_history(hash: &Hash) -> String {
    format!("bth-{hash}")
}

/// `bo-<txhash>-<idx>` → [`crate::BlockOperation`]
pub fn block_operation(tx_hash: &Hash, index: usize) -> String {
    format!("bo-{tx_hash}-{index:04}")
}

/// `bo-src-<address>-<height>-<txhash>-<idx>` → [`crate::BlockOperation`]
/// (index by source; a reverse scan yields the latest operation first)
pub fn block_operation_source(
    address: &Address,
    height: u64,
    tx_hash: &Hash,
    index: usize,
) -> String {
    format!("bo-src-{address}-{height:020}-{tx_hash}-{index:04}")
}

/// Prefix of every source-indexed operation of `address`.
pub fn block_operation_source_prefix(address: &Address) -> String {
    format!("bo-src-{address}-")
}

/// `blk-<height>` → [`isaac_types::Block`]
pub fn block(height: u64) -> String {
    format!("blk-{height:020}")
}

/// Prefix of all block records, for latest-block scans.
pub const BLOCK_PREFIX: &str = "blk-";

/// `blkh-<hash>` → block height
pub fn block_height(hash: &Hash) -> String {
    format!("blkh-{hash}")
}

/// `bp-<hash>` → pooled transaction (durable complement of the in-memory pool)
pub fn pooled_transaction(hash: &Hash) -> String {
    format!("bp-{hash}")
}
