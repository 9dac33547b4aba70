//! Ballot ingress and the ballot transaction chain.
//!
//! Two jobs. First, every received ballot passes the ingress check: decode,
//! signature, and a signer drawn from the known validator set. Second, a
//! proposer's INIT ballot has its transaction list audited by the ballot
//! transaction chain, which narrows the candidate list stage by stage and
//! lands on the node's INIT vote.

use crate::{run_chain, NodeConfig, NodeError, StageOutcome};
use isaac_mempool::TransactionPool;
use isaac_messages::NetworkMessage;
use isaac_storage::{self as storage, Store};
use isaac_types::{
    Amount, Ballot, Hash, ProposerTransaction, ValidatorSet, Vote,
};
use std::collections::HashSet;
use tracing::debug;

/// Ingress check for a ballot message: typed extraction, signature over the
/// network id, known signer, and a broadcastable vote.
pub fn check_ballot(
    message: NetworkMessage,
    validators: &ValidatorSet,
    network_id: &[u8],
) -> Result<Ballot, NodeError> {
    let ballot = message
        .into_ballot()
        .ok_or_else(|| NodeError::Malformed("expected a ballot".into()))?;
    ballot.verify(network_id)?;
    if !validators.contains(ballot.signer()) {
        return Err(NodeError::UnknownSigner);
    }
    if ballot.vote() == Vote::NotYet {
        return Err(NodeError::Malformed("ballot carries no vote".into()));
    }
    Ok(ballot)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotTxStage {
    IsNew,
    CheckMissing,
    SameSource,
    Validate,
    CollectTxFee,
    AllValid,
}

/// The ballot transaction chain in execution order.
pub const BALLOT_TX_CHAIN: [BallotTxStage; 6] = [
    BallotTxStage::IsNew,
    BallotTxStage::CheckMissing,
    BallotTxStage::SameSource,
    BallotTxStage::Validate,
    BallotTxStage::CollectTxFee,
    BallotTxStage::AllValid,
];

/// Context of the ballot transaction chain. `valid` narrows stage by stage;
/// the final stage compares it against the full proposal to pick the vote.
pub struct BallotTxContext<'a> {
    pub store: &'a dyn Store,
    pub pool: &'a TransactionPool,
    pub config: &'a NodeConfig,

    /// The proposal's full transaction hash list.
    pub transactions: Vec<Hash>,
    pub proposer_transaction: Option<ProposerTransaction>,

    /// Hashes that survived every stage so far.
    pub valid: Vec<Hash>,
    /// The resulting INIT vote.
    pub vote: Vote,
}

impl<'a> BallotTxContext<'a> {
    pub fn new(
        ballot: &Ballot,
        store: &'a dyn Store,
        pool: &'a TransactionPool,
        config: &'a NodeConfig,
    ) -> Self {
        Self {
            store,
            pool,
            config,
            transactions: ballot.body.transactions.clone(),
            proposer_transaction: ballot.body.proposer_transaction.clone(),
            valid: ballot.body.transactions.clone(),
            vote: Vote::NotYet,
        }
    }
}

/// Run the chain and produce this node's INIT vote on the proposal. Chain
/// errors are themselves a NO vote, not a drop: the ballot is real, its
/// content is not acceptable.
pub fn audit_proposal(ctx: &mut BallotTxContext<'_>) -> Vote {
    match run_chain(&BALLOT_TX_CHAIN, ctx, run_ballot_tx_stage) {
        Ok(()) => ctx.vote,
        Err(e) => {
            debug!(error = %e, "proposal audit failed");
            Vote::No
        }
    }
}

pub fn run_ballot_tx_stage(stage: BallotTxStage, ctx: &mut BallotTxContext<'_>) -> StageOutcome {
    match run_stage(stage, ctx) {
        Ok(()) => StageOutcome::Next,
        Err(e) => StageOutcome::Err(e),
    }
}

fn run_stage(stage: BallotTxStage, ctx: &mut BallotTxContext<'_>) -> Result<(), NodeError> {
    match stage {
        // Drop hashes already settled in some block.
        BallotTxStage::IsNew => {
            let mut valid = Vec::with_capacity(ctx.valid.len());
            for hash in &ctx.valid {
                if !storage::exists_block_transaction(ctx.store, hash)? {
                    valid.push(*hash);
                }
            }
            ctx.valid = valid;
        }
        // Drop hashes we never saw; a proposal we cannot audit in full gets
        // a NO from AllValid.
        BallotTxStage::CheckMissing => {
            let pool = ctx.pool;
            ctx.valid.retain(|hash| pool.has(hash));
        }
        // One transaction per source within a single proposal.
        BallotTxStage::SameSource => {
            let mut sources = HashSet::new();
            let mut valid = Vec::with_capacity(ctx.valid.len());
            for hash in &ctx.valid {
                let Some(tx) = ctx.pool.get(hash) else {
                    continue;
                };
                if sources.insert(tx.source().clone()) {
                    valid.push(*hash);
                }
            }
            ctx.valid = valid;
        }
        BallotTxStage::Validate => {
            let mut valid = Vec::with_capacity(ctx.valid.len());
            for hash in &ctx.valid {
                let Some(tx) = ctx.pool.get(hash) else {
                    continue;
                };
                if storage::validate_tx(ctx.store, &tx, ctx.config.consensus.unfreezing_period)
                    .is_ok()
                {
                    valid.push(*hash);
                }
            }
            ctx.valid = valid;
        }
        // The proposer's collected fee must equal the sum over the full
        // proposed list.
        BallotTxStage::CollectTxFee => {
            let collected = ctx
                .proposer_transaction
                .as_ref()
                .map(|ptx| ptx.collected)
                .unwrap_or(Amount::ZERO);
            if ctx.transactions.is_empty() {
                if !collected.is_zero() {
                    return Err(NodeError::InvalidFee);
                }
            } else {
                let mut fees = Amount::ZERO;
                for hash in &ctx.transactions {
                    let tx = ctx.pool.get(hash).ok_or(NodeError::TransactionNotFound)?;
                    fees = fees.add(tx.fee())?;
                }
                if collected != fees {
                    return Err(NodeError::InvalidFee);
                }
            }
        }
        BallotTxStage::AllValid => {
            ctx.vote = if ctx.valid.len() == ctx.transactions.len() {
                Vote::Yes
            } else {
                Vote::No
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_storage::MemoryStore;
    use isaac_types::{
        Account, BallotBody, BallotState, KeyPair, Operation, Transaction, TransactionBody,
        VotingBasis, BASE_FEE,
    };

    const NETWORK_ID: &[u8] = b"test-network";

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.consensus.network_id = NETWORK_ID.to_vec();
        config
    }

    fn keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed([seed; 32])
    }

    fn funded_store(seeds: &[u8]) -> MemoryStore {
        let store = MemoryStore::new();
        let accounts: Vec<Account> = seeds
            .iter()
            .map(|s| Account::new(keypair(*s).address(), Amount::new(1_000_000)))
            .collect();
        isaac_storage::make_genesis(&store, &accounts, keypair(99).address(), "t0".into()).unwrap();
        store
    }

    fn payment(seed: u8) -> Transaction {
        let kp = keypair(seed);
        Transaction::create(
            TransactionBody {
                source: kp.address(),
                fee: BASE_FEE,
                sequence_id: 0,
                operations: vec![Operation::Payment {
                    target: keypair(1).address(),
                    amount: Amount::new(100),
                }],
            },
            &kp,
            NETWORK_ID,
        )
        .unwrap()
    }

    fn proposal_ballot(txs: &[Transaction], collected: Option<Amount>) -> Ballot {
        let proposer = keypair(1);
        let hashes: Vec<Hash> = txs.iter().map(|t| t.hash()).collect();
        let proposer_transaction = collected.map(|amount| ProposerTransaction {
            proposer: proposer.address(),
            collected: amount,
            committed_txs: txs.len() as u64,
            block_height: 2,
        });
        Ballot::create(
            BallotBody {
                basis: VotingBasis {
                    height: 2,
                    round: 0,
                    block_hash: Hash::from_bytes(b"proposal"),
                    total_txs: txs.len() as u64,
                },
                proposer: proposer.address(),
                signer: proposer.address(),
                state: BallotState::Init,
                vote: Vote::Yes,
                transactions: hashes,
                proposer_transaction,
                confirmed: "0".into(),
            },
            &proposer,
            NETWORK_ID,
        )
        .unwrap()
    }

    #[test]
    fn all_present_and_valid_votes_yes() {
        let config = config();
        let store = funded_store(&[1, 2, 3]);
        let pool = TransactionPool::new();
        let t1 = payment(2);
        let t2 = payment(3);
        pool.add(t1.clone());
        pool.add(t2.clone());

        let collected = Amount::new(2 * BASE_FEE.raw());
        let ballot = proposal_ballot(&[t1, t2], Some(collected));
        let mut ctx = BallotTxContext::new(&ballot, &store, &pool, &config);
        assert_eq!(audit_proposal(&mut ctx), Vote::Yes);
        assert_eq!(ctx.valid.len(), 2);
    }

    #[test]
    fn missing_transaction_votes_no() {
        let config = config();
        let store = funded_store(&[1, 2, 3]);
        let pool = TransactionPool::new();
        let t1 = payment(2);
        let t2 = payment(3);
        pool.add(t1.clone());
        // t2 never reached this node. The fee check still sees the full
        // list, so it fails first with a missing transaction.
        let collected = Amount::new(2 * BASE_FEE.raw());
        let ballot = proposal_ballot(&[t1, t2], Some(collected));
        let mut ctx = BallotTxContext::new(&ballot, &store, &pool, &config);
        assert_eq!(audit_proposal(&mut ctx), Vote::No);
    }

    #[test]
    fn same_source_within_ballot_votes_no() {
        let config = config();
        let store = funded_store(&[1, 2]);
        let pool = TransactionPool::new();
        let t1 = payment(2);
        // Same source, different amount.
        let kp = keypair(2);
        let t2 = Transaction::create(
            TransactionBody {
                source: kp.address(),
                fee: BASE_FEE,
                sequence_id: 0,
                operations: vec![Operation::Payment {
                    target: keypair(1).address(),
                    amount: Amount::new(7),
                }],
            },
            &kp,
            NETWORK_ID,
        )
        .unwrap();
        pool.add(t1.clone());
        pool.add(t2.clone());

        let ballot = proposal_ballot(&[t1.clone(), t2], Some(Amount::new(2 * BASE_FEE.raw())));
        let mut ctx = BallotTxContext::new(&ballot, &store, &pool, &config);
        assert_eq!(audit_proposal(&mut ctx), Vote::No);
        // Only the first transaction per source survives the narrowing.
        assert_eq!(ctx.valid, vec![t1.hash()]);
    }

    #[test]
    fn wrong_collected_fee_votes_no() {
        let config = config();
        let store = funded_store(&[1, 2]);
        let pool = TransactionPool::new();
        let t1 = payment(2);
        pool.add(t1.clone());

        let ballot = proposal_ballot(&[t1], Some(Amount::new(1)));
        let mut ctx = BallotTxContext::new(&ballot, &store, &pool, &config);
        assert_eq!(audit_proposal(&mut ctx), Vote::No);
    }

    #[test]
    fn empty_proposal_with_zero_fee_votes_yes() {
        let config = config();
        let store = funded_store(&[1]);
        let pool = TransactionPool::new();

        let ballot = proposal_ballot(&[], None);
        let mut ctx = BallotTxContext::new(&ballot, &store, &pool, &config);
        assert_eq!(audit_proposal(&mut ctx), Vote::Yes);

        let ballot = proposal_ballot(&[], Some(Amount::new(5)));
        let mut ctx = BallotTxContext::new(&ballot, &store, &pool, &config);
        assert_eq!(audit_proposal(&mut ctx), Vote::No);
    }

    #[test]
    fn ingress_rejects_unknown_signer() {
        use isaac_types::{ValidatorInfo, ValidatorSet};
        let validators = ValidatorSet::new(vec![ValidatorInfo {
            address: keypair(1).address(),
            endpoint: "http://v1".into(),
        }]);
        // Signed by someone outside the set.
        let outsider = keypair(8);
        let ballot = Ballot::create(
            BallotBody {
                basis: VotingBasis {
                    height: 2,
                    round: 0,
                    block_hash: Hash::ZERO,
                    total_txs: 0,
                },
                proposer: outsider.address(),
                signer: outsider.address(),
                state: BallotState::Init,
                vote: Vote::Yes,
                transactions: vec![],
                proposer_transaction: None,
                confirmed: "0".into(),
            },
            &outsider,
            NETWORK_ID,
        )
        .unwrap();
        assert!(matches!(
            check_ballot(ballot.into(), &validators, NETWORK_ID),
            Err(NodeError::UnknownSigner)
        ));
    }
}
