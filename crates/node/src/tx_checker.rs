//! The transaction ingress chain.
//!
//! Every transaction received from a client or a peer runs this chain before
//! it reaches the pool:
//!
//! 1. Unmarshal: typed extraction and well-formedness
//! 2. HasTransaction: already pooled or persisted transactions go no further
//! 3. SaveHistory: duplicate submissions are dropped by their history marker,
//!    fresh ones are recorded as submitted
//! 4. SameSource: one pending transaction per source
//! 5. Validate: full semantic validation against the ledger
//! 6. AddToPool: stage into the pool, durably mirrored
//! 7. Broadcast: queue the message for the other validators

use crate::{run_chain, NodeConfig, NodeError, StageOutcome};
use isaac_mempool::TransactionPool;
use isaac_messages::NetworkMessage;
use isaac_storage::{self as storage, HistoryStatus, Store};
use isaac_types::Transaction;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Unmarshal,
    HasTransaction,
    SaveHistory,
    SameSource,
    Validate,
    AddToPool,
    Broadcast,
}

/// The ingress chain in execution order.
pub const TX_CHAIN: [TxStage; 7] = [
    TxStage::Unmarshal,
    TxStage::HasTransaction,
    TxStage::SaveHistory,
    TxStage::SameSource,
    TxStage::Validate,
    TxStage::AddToPool,
    TxStage::Broadcast,
];

/// Shared context of the ingress chain: immutable inputs plus the narrow
/// accumulators later stages and the runner read.
pub struct TxContext<'a> {
    pub message: NetworkMessage,
    pub store: &'a dyn Store,
    pub pool: &'a TransactionPool,
    pub config: &'a NodeConfig,

    /// Set by Unmarshal.
    pub transaction: Option<Transaction>,
    /// Filled by Broadcast; the runner performs the sends so no lock is ever
    /// held across network I/O.
    pub outbound: Vec<NetworkMessage>,
}

impl<'a> TxContext<'a> {
    pub fn new(
        message: NetworkMessage,
        store: &'a dyn Store,
        pool: &'a TransactionPool,
        config: &'a NodeConfig,
    ) -> Self {
        Self {
            message,
            store,
            pool,
            config,
            transaction: None,
            outbound: Vec::new(),
        }
    }

    fn transaction(&self) -> &Transaction {
        self.transaction
            .as_ref()
            .expect("stage order puts Unmarshal first")
    }
}

/// Run the whole ingress chain.
pub fn run_tx_chain(ctx: &mut TxContext<'_>) -> Result<(), NodeError> {
    run_chain(&TX_CHAIN, ctx, run_tx_stage)
}

pub fn run_tx_stage(stage: TxStage, ctx: &mut TxContext<'_>) -> StageOutcome {
    match run_stage(stage, ctx) {
        Ok(()) => StageOutcome::Next,
        Err(e) => StageOutcome::Err(e),
    }
}

fn run_stage(stage: TxStage, ctx: &mut TxContext<'_>) -> Result<(), NodeError> {
    match stage {
        TxStage::Unmarshal => {
            let tx = ctx
                .message
                .clone()
                .into_transaction()
                .ok_or_else(|| NodeError::Malformed("expected a transaction".into()))?;
            tx.is_well_formed(&ctx.config.consensus.network_id, ctx.config.consensus.ops_limit)?;
            debug!(hash = %tx.hash(), "message is transaction");
            ctx.transaction = Some(tx);
        }
        TxStage::HasTransaction => {
            let hash = ctx.transaction().hash();
            if ctx.pool.has(&hash) || storage::exists_block_transaction(ctx.store, &hash)? {
                return Err(NodeError::KnownMessage);
            }
        }
        TxStage::SaveHistory => {
            let hash = ctx.transaction().hash();
            if storage::exists_transaction_history(ctx.store, &hash)? {
                debug!(%hash, "found in history");
                return Err(NodeError::KnownMessage);
            }
            storage::save_transaction_history(ctx.store, &hash, HistoryStatus::Submitted)?;
        }
        TxStage::SameSource => {
            if ctx.pool.is_same_source(ctx.transaction().source()) {
                return Err(NodeError::SameSource);
            }
        }
        TxStage::Validate => {
            storage::validate_tx(
                ctx.store,
                ctx.transaction(),
                ctx.config.consensus.unfreezing_period,
            )?;
        }
        TxStage::AddToPool => {
            let tx = ctx.transaction().clone();
            storage::save_pooled_transaction(ctx.store, &tx)?;
            ctx.pool.add(tx);
            debug!(len = ctx.pool.len(), "push transaction into pool");
        }
        TxStage::Broadcast => {
            ctx.outbound.push(ctx.transaction().clone().into());
        }
    }
    Ok(())
}
