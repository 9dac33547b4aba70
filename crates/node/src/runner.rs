//! The node runner.
//!
//! One event loop owns the consensus state machine and performs all of its
//! I/O: inbound messages run the checker chains and become events, timer
//! fires become events, and the returned actions drive timers, broadcasts,
//! block commits, and sync targets. Locks are never held across a network
//! send; the chains queue outbound messages and the runner sends them after.

use crate::{
    audit_proposal, check_ballot, metrics, run_tx_chain, BallotTxContext, ConnectionManager,
    NodeConfig, NodeError, TimerManager, TxContext,
};
use isaac_consensus::{IsaacState, ProposerSelector};
use isaac_core::{Action, Event, StateMachine, TimerId};
use isaac_mempool::TransactionPool;
use isaac_messages::{GetBlockRequest, GetBlockResponse, NetworkMessage};
use isaac_storage::{self as storage, apply_block, LedgerError, Store};
use isaac_types::{BallotState, Block, Hash, KeyPair, Transaction, ValidatorSet};
use isaac_sync::{
    BlockFetchClient, BlockFetcher, BlockValidator, BlockWaitBus, SyncHandle, Syncer,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Answer a peer's block fetch: the stored block at the requested height plus
/// the full bodies of its transactions. `None` if we do not have that height.
/// The node-to-node transport serves this for [`GetBlockRequest`]s.
pub fn serve_block(
    store: &dyn Store,
    request: GetBlockRequest,
) -> Result<Option<GetBlockResponse>, NodeError> {
    let Some(block) = storage::get_block(store, request.height)? else {
        return Ok(None);
    };
    let mut transactions = Vec::with_capacity(block.transactions.len());
    for hash in &block.transactions {
        match storage::get_block_transaction(store, hash)? {
            Some(record) => transactions.push(record.transaction),
            // A block without its transactions means local corruption; let
            // the peer try elsewhere.
            None => return Ok(None),
        }
    }
    Ok(Some(GetBlockResponse {
        block,
        transactions,
    }))
}

/// A validator node: consensus loop, admission pipeline, and sync engine.
pub struct NodeRunner {
    config: NodeConfig,
    validators: ValidatorSet,
    store: Arc<dyn Store>,
    pool: Arc<TransactionPool>,
    isaac: IsaacState,
    network: Arc<dyn ConnectionManager>,
    timers: TimerManager,
    timer_rx: mpsc::Receiver<TimerId>,
    inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    wait_bus: Arc<BlockWaitBus>,
    sync_handle: SyncHandle,
    syncer: Option<Syncer>,
    cancel: CancellationToken,
}

impl NodeRunner {
    /// Build a runner over an already-initialized chain (genesis present).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: NodeConfig,
        keypair: KeyPair,
        validators: ValidatorSet,
        selector: Box<dyn ProposerSelector>,
        store: Arc<dyn Store>,
        network: Arc<dyn ConnectionManager>,
        fetch_client: Arc<dyn BlockFetchClient>,
        inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
        cancel: CancellationToken,
    ) -> Result<Self, NodeError> {
        let latest = storage::latest_block(store.as_ref())?.ok_or(NodeError::EmptyChain)?;

        let isaac = IsaacState::new(
            keypair,
            validators.clone(),
            selector,
            config.consensus.clone(),
            &latest,
        )?;

        let pool = Arc::new(TransactionPool::new());
        let wait_bus = Arc::new(BlockWaitBus::new());
        let fetcher = BlockFetcher::new(fetch_client, &config.sync);
        let validator = Arc::new(BlockValidator::new(
            Arc::clone(&store),
            config.consensus.network_id.clone(),
            config.consensus.ops_limit,
            config.consensus.unfreezing_period,
        ));
        let (syncer, sync_handle) = Syncer::new(
            config.sync.clone(),
            Arc::clone(&store),
            fetcher,
            validator,
            Arc::clone(&wait_bus),
            cancel.child_token(),
        );
        let (timers, timer_rx) = TimerManager::new();

        Ok(Self {
            config,
            validators,
            store,
            pool,
            isaac,
            network,
            timers,
            timer_rx,
            inbound_rx,
            wait_bus,
            sync_handle,
            syncer: Some(syncer),
            cancel,
        })
    }

    pub fn pool(&self) -> Arc<TransactionPool> {
        Arc::clone(&self.pool)
    }

    pub fn sync_handle(&self) -> SyncHandle {
        self.sync_handle.clone()
    }

    /// Run until cancelled or a fatal storage failure. Shuts down cleanly:
    /// timers cancelled, sync work pool drained.
    pub async fn run(mut self) -> Result<(), NodeError> {
        let syncer = self
            .syncer
            .take()
            .expect("run is called once per constructed runner");
        let sync_task = tokio::spawn(syncer.run());

        info!(height = self.isaac.height(), "starting node runner");
        self.isaac.set_time(unix_now());
        let actions = self.isaac.start();
        let mut result = self.execute(actions).await;

        while result.is_ok() {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(id) = self.timer_rx.recv() => {
                    let event = self.timer_event(id);
                    result = self.dispatch(event).await;
                }
                Some(bytes) = self.inbound_rx.recv() => {
                    result = self.on_message(&bytes).await;
                }
            }
        }

        // Clean shutdown either way: stop timers, drain the sync pool.
        self.timers.cancel_all();
        self.cancel.cancel();
        let _ = sync_task.await;
        info!("stopped node runner");
        result
    }

    fn timer_event(&self, id: TimerId) -> Event {
        match id {
            TimerId::Propose => {
                let hashes = self
                    .pool
                    .available_transactions(self.config.consensus.txs_limit);
                let available: Vec<Transaction> =
                    hashes.iter().filter_map(|hash| self.pool.get(hash)).collect();
                Event::ProposeTimer { available }
            }
            TimerId::Init => Event::InitTimeout,
            TimerId::Sign => Event::SignTimeout,
            TimerId::Accept => Event::AcceptTimeout,
        }
    }

    async fn dispatch(&mut self, event: Event) -> Result<(), NodeError> {
        self.isaac.set_time(unix_now());
        let actions = self.isaac.handle(event);
        self.execute(actions).await
    }

    async fn on_message(&mut self, bytes: &[u8]) -> Result<(), NodeError> {
        let message = match NetworkMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "dropping malformed message");
                return Ok(());
            }
        };
        match message {
            NetworkMessage::Transaction { .. } => self.on_transaction(message).await,
            NetworkMessage::Ballot { .. } => self.on_ballot(message).await,
        }
    }

    async fn on_transaction(&mut self, message: NetworkMessage) -> Result<(), NodeError> {
        let outbound = {
            let mut ctx = TxContext::new(message, self.store.as_ref(), &self.pool, &self.config);
            match run_tx_chain(&mut ctx) {
                Ok(()) => {
                    metrics::record_transaction_admitted(self.pool.len());
                    ctx.outbound
                }
                Err(e) if e.is_known() => {
                    debug!("transaction already known");
                    return Ok(());
                }
                Err(e) => {
                    metrics::record_transaction_rejected();
                    debug!(error = %e, "transaction rejected");
                    // Mark the rejection where a marker survived; the
                    // operation-failure path already dropped its marker so
                    // the transaction may be retried.
                    if let Some(tx) = &ctx.transaction {
                        let hash = tx.hash();
                        match storage::exists_transaction_history(ctx.store, &hash) {
                            Ok(true) => {
                                if let Err(e) = storage::save_transaction_history(
                                    ctx.store,
                                    &hash,
                                    storage::HistoryStatus::Rejected,
                                ) {
                                    warn!(error = %e, %hash, "could not mark rejection");
                                }
                            }
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, %hash, "could not read history"),
                        }
                    }
                    return Ok(());
                }
            }
        };
        for message in outbound {
            self.network.broadcast(message).await;
        }
        Ok(())
    }

    async fn on_ballot(&mut self, message: NetworkMessage) -> Result<(), NodeError> {
        let ballot = match check_ballot(
            message,
            &self.validators,
            &self.config.consensus.network_id,
        ) {
            Ok(ballot) => ballot,
            Err(e) => {
                debug!(error = %e, "dropping ballot");
                return Ok(());
            }
        };
        metrics::record_ballot_processed();

        // Sync may have advanced the chain past the machine's idea of it;
        // re-anchor before judging the ballot stale or ahead.
        if ballot.basis().height > self.isaac.height() {
            if let Some(latest) = storage::latest_block(self.store.as_ref())? {
                let actions = self.isaac.refresh_latest(&latest);
                self.execute(actions).await?;
            }
        }

        let event = if ballot.state() == BallotState::Init && ballot.is_from_proposer() {
            let vote = {
                let mut ctx =
                    BallotTxContext::new(&ballot, self.store.as_ref(), &self.pool, &self.config);
                audit_proposal(&mut ctx)
            };
            Event::ProposalReceived { ballot, vote }
        } else {
            Event::BallotReceived { ballot }
        };
        self.dispatch(event).await
    }

    async fn execute(&mut self, actions: Vec<Action>) -> Result<(), NodeError> {
        for action in actions {
            match action {
                Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
                Action::CancelTimer { id } => self.timers.cancel_timer(id),
                Action::BroadcastBallot { ballot } => {
                    self.network.broadcast(ballot.into()).await;
                }
                Action::CommitBlock {
                    block,
                    transactions,
                } => self.commit_block(block, transactions).await?,
                Action::SetSyncTarget { height } => {
                    let peers = self.network.known_endpoints();
                    if let Err(e) = self.sync_handle.set_sync_target(height, peers).await {
                        warn!(error = %e, height, "could not hand target to syncer");
                    }
                }
            }
        }
        Ok(())
    }

    async fn commit_block(&mut self, block: Block, hashes: Vec<Hash>) -> Result<(), NodeError> {
        let mut transactions = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            match self.pool.get(hash) {
                Some(tx) => transactions.push(tx),
                None => {
                    // We were outvoted on a proposal we could not fully
                    // audit; fetch the block like any other gap.
                    warn!(%hash, height = block.height, "decided transaction not in pool, syncing");
                    let peers = self.network.known_endpoints();
                    let _ = self.sync_handle.set_sync_target(block.height, peers).await;
                    return Ok(());
                }
            }
        }

        match apply_block(self.store.as_ref(), &block, &transactions) {
            Ok(()) => {}
            Err(LedgerError::Storage(e)) => return Err(e.into()),
            Err(e) => {
                // Already applied by sync, or we diverged; catching up is
                // the recovery for both.
                warn!(error = %e, height = block.height, "commit skipped");
                let peers = self.network.known_endpoints();
                let _ = self.sync_handle.set_sync_target(block.height, peers).await;
                return Ok(());
            }
        }

        self.pool.remove(&hashes);
        self.wait_bus.notify(block.height);
        metrics::record_block_committed(block.height, self.pool.len());
        info!(
            height = block.height,
            hash = %block.hash,
            txs = hashes.len(),
            "block committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_storage::{apply_block, make_genesis, MemoryStore};
    use isaac_types::{
        Account, Amount, Operation, ProposerTransaction, TransactionBody, BASE_FEE,
    };

    const NETWORK_ID: &[u8] = b"test-network";

    #[test]
    fn serve_block_returns_full_bodies() {
        let store = MemoryStore::new();
        let alice = KeyPair::from_seed([1; 32]);
        let bob = KeyPair::from_seed([2; 32]);
        let genesis = make_genesis(
            &store,
            &[
                Account::new(alice.address(), Amount::new(1_000_000)),
                Account::new(bob.address(), Amount::new(0)),
            ],
            KeyPair::from_seed([99; 32]).address(),
            "t0".into(),
        )
        .unwrap();

        let tx = Transaction::create(
            TransactionBody {
                source: alice.address(),
                fee: BASE_FEE,
                sequence_id: 0,
                operations: vec![Operation::Payment {
                    target: bob.address(),
                    amount: Amount::new(50),
                }],
            },
            &alice,
            NETWORK_ID,
        )
        .unwrap();
        let block = Block::new(
            2,
            genesis.hash,
            KeyPair::from_seed([99; 32]).address(),
            vec![tx.hash()],
            Some(
                ProposerTransaction::collect(
                    KeyPair::from_seed([99; 32]).address(),
                    [tx.fee()],
                    1,
                    2,
                )
                .unwrap(),
            ),
            1,
            "t1".into(),
        )
        .unwrap();
        apply_block(&store, &block, std::slice::from_ref(&tx)).unwrap();

        let response = serve_block(&store, GetBlockRequest { height: 2 })
            .unwrap()
            .expect("height 2 is persisted");
        assert_eq!(response.block, block);
        assert_eq!(response.transactions, vec![tx]);

        assert!(serve_block(&store, GetBlockRequest { height: 99 })
            .unwrap()
            .is_none());
    }
}
