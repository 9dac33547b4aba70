//! Validation and persistence of fetched blocks.

use isaac_messages::GetBlockResponse;
use isaac_storage::{
    apply_block, get_block, validate_tx, LedgerError, StorageError, Store, ValidationError,
};
use isaac_types::{Amount, AmountError, TransactionError};
use std::sync::Arc;
use tracing::debug;

/// Why a fetched block was rejected. All of these are retried against another
/// peer; the one we asked may be malicious or stale.
#[derive(Debug, thiserror::Error)]
pub enum SyncValidationError {
    #[error("block hash does not match its content")]
    BadBlockHash,
    #[error("missing parent block at height {0}")]
    MissingParent(u64),
    #[error("block does not link to the local chain at height {0}")]
    LinkageMismatch(u64),
    #[error("transaction bodies do not match the block")]
    TransactionMismatch,
    #[error("collected fee does not match the included transactions")]
    FeeMismatch,
    #[error("malformed transaction: {0}")]
    MalformedTransaction(#[from] TransactionError),
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] ValidationError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Re-validates a fetched block candidate and persists it atomically.
pub struct BlockValidator {
    store: Arc<dyn Store>,
    network_id: Vec<u8>,
    ops_limit: usize,
    unfreezing_period: u64,
}

impl BlockValidator {
    pub fn new(
        store: Arc<dyn Store>,
        network_id: Vec<u8>,
        ops_limit: usize,
        unfreezing_period: u64,
    ) -> Self {
        Self {
            store,
            network_id,
            ops_limit,
            unfreezing_period,
        }
    }

    /// Check the candidate against the local chain and apply it.
    ///
    /// The parent block must already be persisted; the sync loop submits
    /// heights monotonically, so a failure here just means "not yet" and the
    /// worker retries.
    pub fn validate_and_store(&self, response: &GetBlockResponse) -> Result<(), SyncValidationError> {
        let block = &response.block;
        let store = self.store.as_ref();

        if !block.verify_hash()? {
            return Err(SyncValidationError::BadBlockHash);
        }

        let parent = get_block(store, block.height - 1)?
            .ok_or(SyncValidationError::MissingParent(block.height - 1))?;
        if block.prev_hash != parent.hash {
            return Err(SyncValidationError::LinkageMismatch(parent.height));
        }

        if response.transactions.len() != block.transactions.len()
            || response
                .transactions
                .iter()
                .zip(&block.transactions)
                .any(|(tx, hash)| tx.hash() != *hash)
        {
            return Err(SyncValidationError::TransactionMismatch);
        }

        let fees: Result<Amount, AmountError> =
            response.transactions.iter().map(|tx| tx.fee()).sum();
        let collected = block
            .proposer_transaction
            .as_ref()
            .map(|ptx| ptx.collected)
            .unwrap_or(Amount::ZERO);
        if fees? != collected {
            return Err(SyncValidationError::FeeMismatch);
        }

        for tx in &response.transactions {
            tx.is_well_formed(&self.network_id, self.ops_limit)?;
            validate_tx(store, tx, self.unfreezing_period)?;
        }

        apply_block(store, block, &response.transactions)?;
        debug!(height = block.height, hash = %block.hash, "synced block applied");
        Ok(())
    }
}
