//! ISAAC consensus state machine.
//!
//! This module implements the three-phase ballot state machine as a
//! synchronous, event-driven model: the runner delivers [`Event`]s, the
//! machine mutates itself and returns [`Action`]s, and performs no I/O.
//!
//! # State Machine Flow
//!
//! 1. **Propose Timer** → round starts; the proposer drains the pool and
//!    broadcasts its INIT ballot
//! 2. **Proposal Received** → reconstruct the proposed block, vote YES/NO,
//!    broadcast own INIT ballot
//! 3. **Ballot Received** → tally; on YES quorum advance INIT → SIGN →
//!    ACCEPT; on ACCEPT quorum commit and move to the next height
//! 4. **Phase Timeout** → broadcast EXPIRED; on EXPIRED quorum (or a NO
//!    decision) abandon the round and start (height, round + 1)

use crate::{Decision, IsaacConfig, ProposerSelector, VotingBox};
use isaac_core::{Action, Event, StateMachine, TimerId};
use isaac_types::{
    Address, Ballot, BallotBody, BallotState, Block, Hash, KeyPair, ProposerTransaction,
    Transaction, ValidatorSet, Vote, VotingBasis,
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Error constructing the consensus machine: quorum over an empty validator
/// set is meaningless, and proposer rotation could not pick anyone.
#[derive(Debug, thiserror::Error)]
#[error("validator set is empty")]
pub struct EmptyValidatorSet;

/// The proposal under vote in the current round.
#[derive(Debug, Clone)]
struct RunningRound {
    basis: VotingBasis,
    proposer: Address,
    transactions: Vec<Hash>,
    proposer_transaction: Option<ProposerTransaction>,
    confirmed: String,
}

/// ISAAC ballot consensus state machine.
pub struct IsaacState {
    keypair: KeyPair,
    local: Address,
    validators: ValidatorSet,
    selector: Box<dyn ProposerSelector>,
    config: IsaacConfig,

    /// Height being decided; one above the last committed block.
    height: u64,
    round: u64,
    state: BallotState,
    /// False between a commit and the next propose tick.
    round_active: bool,

    /// Hash of the last committed block.
    latest_block_hash: Hash,
    /// Cumulative transaction count of the last committed block.
    latest_total_txs: u64,

    voting_box: VotingBox,
    proposal: Option<RunningRound>,

    /// When the current height's first round started; the block-time floor is
    /// measured from here.
    round_started_at: Duration,

    /// Current time (set by the runner before each handle call).
    now: Duration,
}

impl std::fmt::Debug for IsaacState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsaacState")
            .field("local", &self.local)
            .field("height", &self.height)
            .field("round", &self.round)
            .field("state", &self.state)
            .field("round_active", &self.round_active)
            .field("has_proposal", &self.proposal.is_some())
            .finish()
    }
}

impl IsaacState {
    /// Create a state machine positioned one above the given committed block.
    ///
    /// Fails on an empty validator set; every later proposer and quorum
    /// computation relies on it being non-empty.
    pub fn new(
        keypair: KeyPair,
        validators: ValidatorSet,
        selector: Box<dyn ProposerSelector>,
        config: IsaacConfig,
        latest: &Block,
    ) -> Result<Self, EmptyValidatorSet> {
        if validators.is_empty() {
            return Err(EmptyValidatorSet);
        }
        let local = keypair.address();
        Ok(Self {
            keypair,
            local,
            validators,
            selector,
            config,
            height: latest.height + 1,
            round: 0,
            state: BallotState::Init,
            round_active: false,
            latest_block_hash: latest.hash,
            latest_total_txs: latest.total_txs,
            voting_box: VotingBox::new(),
            proposal: None,
            round_started_at: Duration::ZERO,
            now: Duration::ZERO,
        })
    }

    /// Kick off the first round: wait one block-time floor, then propose.
    pub fn start(&self) -> Vec<Action> {
        vec![Action::SetTimer {
            id: TimerId::Propose,
            duration: self.config.block_time,
        }]
    }

    /// Height currently being decided.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Height of the last committed block.
    pub fn committed_height(&self) -> u64 {
        self.height - 1
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn ballot_state(&self) -> BallotState {
        self.state
    }

    /// The validator expected to propose the current round.
    pub fn expected_proposer(&self) -> Address {
        self.selector
            .select(&self.validators, self.height, self.round)
            .expect("validator set is checked non-empty at construction")
    }

    fn is_local_proposer(&self) -> bool {
        self.expected_proposer() == self.local
    }

    fn timer_of(state: BallotState) -> TimerId {
        match state {
            BallotState::Init => TimerId::Init,
            BallotState::Sign => TimerId::Sign,
            BallotState::Accept => TimerId::Accept,
        }
    }

    /// What the current round votes about. Without a proposal, the expired
    /// basis carries our latest block hash so every stalled validator names
    /// the same thing.
    fn current_basis(&self) -> VotingBasis {
        match &self.proposal {
            Some(running) => running.basis.clone(),
            None => VotingBasis {
                height: self.height,
                round: self.round,
                block_hash: self.latest_block_hash,
                total_txs: self.latest_total_txs,
            },
        }
    }

    /// Build, sign, and record our own ballot for the current round.
    fn own_ballot(&mut self, state: BallotState, vote: Vote) -> Option<Ballot> {
        let (basis, transactions, proposer_transaction, confirmed) = match &self.proposal {
            Some(running) => (
                running.basis.clone(),
                running.transactions.clone(),
                running.proposer_transaction.clone(),
                running.confirmed.clone(),
            ),
            None => (self.current_basis(), Vec::new(), None, String::new()),
        };
        let body = BallotBody {
            basis,
            proposer: self.expected_proposer(),
            signer: self.local.clone(),
            state,
            vote,
            transactions,
            proposer_transaction,
            confirmed,
        };
        match Ballot::create(body, &self.keypair, &self.config.network_id) {
            Ok(ballot) => {
                self.voting_box.record(&ballot);
                Some(ballot)
            }
            Err(e) => {
                error!(error = %e, "failed to sign own ballot");
                None
            }
        }
    }

    /// Re-anchor on a block persisted outside consensus (catch-up sync).
    ///
    /// Abandons whatever round was in flight and starts fresh above the new
    /// chain head. A no-op when the machine is already past `latest`.
    pub fn refresh_latest(&mut self, latest: &Block) -> Vec<Action> {
        if latest.height < self.height {
            return Vec::new();
        }
        info!(
            from = self.height,
            to = latest.height + 1,
            "chain advanced by sync, resetting round"
        );
        self.latest_block_hash = latest.hash;
        self.latest_total_txs = latest.total_txs;
        self.height = latest.height + 1;
        self.round = 0;
        self.state = BallotState::Init;
        self.proposal = None;
        self.round_active = false;
        self.voting_box.prune_below(self.height - 1);
        vec![
            Action::CancelTimer { id: TimerId::Init },
            Action::CancelTimer { id: TimerId::Sign },
            Action::CancelTimer { id: TimerId::Accept },
            Action::SetTimer {
                id: TimerId::Propose,
                duration: self.config.block_time,
            },
        ]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Round start and proposal
    // ═══════════════════════════════════════════════════════════════════════

    fn on_propose_timer(&mut self, available: Vec<Transaction>) -> Vec<Action> {
        if self.round_active && self.state != BallotState::Init {
            // A stale tick; the round is already past INIT.
            return Vec::new();
        }
        if !self.round_active {
            self.round_active = true;
            self.round_started_at = self.now;
        }
        self.state = BallotState::Init;
        let mut actions = vec![Action::SetTimer {
            id: TimerId::Init,
            duration: self.config.timeout_init,
        }];

        if !self.is_local_proposer() || self.proposal.is_some() {
            return actions;
        }

        let included: Vec<Transaction> = available
            .into_iter()
            .take(self.config.txs_limit)
            .collect();
        let hashes: Vec<Hash> = included.iter().map(|tx| tx.hash()).collect();
        let proposer_transaction = if included.is_empty() {
            None
        } else {
            match ProposerTransaction::collect(
                self.local.clone(),
                included.iter().map(|tx| tx.fee()),
                included.len() as u64,
                self.height,
            ) {
                Ok(ptx) => Some(ptx),
                Err(e) => {
                    warn!(error = %e, "fee sum overflow, proposing empty round");
                    None
                }
            }
        };
        let (hashes, proposer_transaction) = if proposer_transaction.is_none() && !hashes.is_empty()
        {
            // Fee overflow above: fall back to an empty proposal.
            (Vec::new(), None)
        } else {
            (hashes, proposer_transaction)
        };

        let confirmed = self.now.as_millis().to_string();
        let block = match Block::new(
            self.height,
            self.latest_block_hash,
            self.local.clone(),
            hashes.clone(),
            proposer_transaction.clone(),
            self.latest_total_txs + hashes.len() as u64,
            confirmed.clone(),
        ) {
            Ok(block) => block,
            Err(e) => {
                error!(error = %e, "failed to encode proposal block");
                return actions;
            }
        };

        info!(
            height = self.height,
            round = self.round,
            txs = hashes.len(),
            block_hash = ?block.hash,
            "proposing block"
        );

        self.proposal = Some(RunningRound {
            basis: VotingBasis {
                height: self.height,
                round: self.round,
                block_hash: block.hash,
                total_txs: block.total_txs,
            },
            proposer: self.local.clone(),
            transactions: hashes,
            proposer_transaction,
            confirmed,
        });

        if let Some(ballot) = self.own_ballot(BallotState::Init, Vote::Yes) {
            actions.push(Action::BroadcastBallot { ballot });
        }
        actions.extend(self.check_and_advance());
        actions
    }

    fn on_proposal(&mut self, ballot: Ballot, vote_hint: Vote) -> Vec<Action> {
        let basis = ballot.basis().clone();
        if basis.height > self.height {
            info!(
                local = self.height - 1,
                observed = basis.height,
                "ballot ahead of local chain, requesting sync"
            );
            return vec![Action::SetSyncTarget { height: basis.height }];
        }
        if basis.height < self.height || basis.round < self.round {
            return Vec::new();
        }
        if basis.round > self.round {
            // We have not expired this round yet; the EXPIRED path will move
            // us forward if the network really is ahead.
            return Vec::new();
        }

        let mut actions = Vec::new();
        if !self.round_active {
            // The proposer beat our block-time floor; the proposal opens the
            // round.
            self.round_active = true;
            self.round_started_at = self.now;
            self.state = BallotState::Init;
            actions.push(Action::CancelTimer { id: TimerId::Propose });
            actions.push(Action::SetTimer {
                id: TimerId::Init,
                duration: self.config.timeout_init,
            });
        }
        if self.state != BallotState::Init || self.proposal.is_some() {
            // Late or repeated proposal; the first one won.
            return actions;
        }

        let mut vote = vote_hint;
        let expected = self.expected_proposer();
        if ballot.body.proposer != expected || !ballot.is_from_proposer() {
            warn!(
                expected = ?expected,
                got = ?ballot.body.proposer,
                "proposal from unexpected proposer"
            );
            vote = Vote::No;
        }

        // The basis hash must be the block every validator rebuilds from the
        // ballot's own content.
        match Block::new(
            self.height,
            self.latest_block_hash,
            ballot.body.proposer.clone(),
            ballot.body.transactions.clone(),
            ballot.body.proposer_transaction.clone(),
            self.latest_total_txs + ballot.body.transactions.len() as u64,
            ballot.body.confirmed.clone(),
        ) {
            Ok(block) if block.hash == basis.block_hash && block.total_txs == basis.total_txs => {}
            Ok(_) => {
                warn!(height = self.height, "proposal basis does not match its content");
                vote = Vote::No;
            }
            Err(e) => {
                warn!(error = %e, "failed to rebuild proposed block");
                vote = Vote::No;
            }
        }

        debug!(
            height = self.height,
            round = self.round,
            vote = ?vote,
            txs = ballot.body.transactions.len(),
            "received proposal"
        );

        self.proposal = Some(RunningRound {
            basis,
            proposer: ballot.body.proposer.clone(),
            transactions: ballot.body.transactions.clone(),
            proposer_transaction: ballot.body.proposer_transaction.clone(),
            confirmed: ballot.body.confirmed.clone(),
        });

        // The proposer's INIT ballot is itself a YES vote.
        self.voting_box.record(&ballot);

        if let Some(own) = self.own_ballot(BallotState::Init, vote) {
            actions.push(Action::BroadcastBallot { ballot: own });
        }
        actions.extend(self.check_and_advance());
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Voting
    // ═══════════════════════════════════════════════════════════════════════

    fn on_ballot(&mut self, ballot: Ballot) -> Vec<Action> {
        let basis = ballot.basis();
        if basis.height > self.height {
            info!(
                local = self.height - 1,
                observed = basis.height,
                "ballot ahead of local chain, requesting sync"
            );
            return vec![Action::SetSyncTarget { height: basis.height }];
        }
        if basis.height < self.height || basis.round < self.round {
            return Vec::new();
        }
        if basis.round > self.round {
            // Future round of the current height: keep the vote, it counts
            // once we advance.
            self.voting_box.record(&ballot);
            return Vec::new();
        }
        if !self.voting_box.record(&ballot) {
            // Duplicate: tally unchanged, no transition.
            return Vec::new();
        }
        self.check_and_advance()
    }

    fn on_phase_timeout(&mut self, state: BallotState) -> Vec<Action> {
        if !self.round_active || state != self.state {
            // A stale timer; the phase already moved on.
            return Vec::new();
        }
        info!(
            height = self.height,
            round = self.round,
            state = %state,
            "phase timed out, voting EXPIRED"
        );
        let mut actions = Vec::new();
        if let Some(ballot) = self.own_ballot(state, Vote::Expired) {
            actions.push(Action::BroadcastBallot { ballot });
        }
        // Rebroadcast on the same cadence until the round resolves.
        actions.push(Action::SetTimer {
            id: Self::timer_of(state),
            duration: self.config.timeout_of(state),
        });
        actions.extend(self.check_and_advance());
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Decisions
    // ═══════════════════════════════════════════════════════════════════════

    fn check_and_advance(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        loop {
            if !self.round_active {
                break;
            }
            let basis = self.current_basis();
            let decision = self.voting_box.decide(
                &basis,
                self.state,
                self.validators.len(),
                self.config.threshold,
            );
            match decision {
                None => break,
                Some(Decision::Yes) => match self.state.next() {
                    Some(next) => {
                        debug!(
                            height = self.height,
                            round = self.round,
                            from = %self.state,
                            to = %next,
                            "quorum reached, advancing phase"
                        );
                        actions.push(Action::CancelTimer {
                            id: Self::timer_of(self.state),
                        });
                        self.state = next;
                        actions.push(Action::SetTimer {
                            id: Self::timer_of(next),
                            duration: self.config.timeout_of(next),
                        });
                        if let Some(ballot) = self.own_ballot(next, Vote::Yes) {
                            actions.push(Action::BroadcastBallot { ballot });
                        }
                    }
                    None => {
                        actions.extend(self.commit());
                        break;
                    }
                },
                Some(Decision::No) | Some(Decision::Expired) => {
                    actions.extend(self.advance_round());
                }
            }
        }
        actions
    }

    fn commit(&mut self) -> Vec<Action> {
        let Some(running) = self.proposal.take() else {
            // An ACCEPT quorum formed on the expired basis; nothing to
            // commit, the round advance path handles it.
            warn!(height = self.height, "accept quorum without a proposal");
            return self.advance_round();
        };
        let block = match Block::new(
            self.height,
            self.latest_block_hash,
            running.proposer.clone(),
            running.transactions.clone(),
            running.proposer_transaction.clone(),
            running.basis.total_txs,
            running.confirmed.clone(),
        ) {
            Ok(block) if block.hash == running.basis.block_hash => block,
            Ok(block) => {
                error!(
                    expected = ?running.basis.block_hash,
                    rebuilt = ?block.hash,
                    "decided basis does not match reconstructed block"
                );
                return Vec::new();
            }
            Err(e) => {
                error!(error = %e, "failed to rebuild decided block");
                return Vec::new();
            }
        };

        info!(
            height = self.height,
            round = self.round,
            block_hash = ?block.hash,
            txs = block.transactions.len(),
            "block decided"
        );

        let transactions = running.transactions;
        self.latest_block_hash = block.hash;
        self.latest_total_txs = block.total_txs;
        self.height += 1;
        self.round = 0;
        self.state = BallotState::Init;
        self.round_active = false;
        self.voting_box.prune_below(self.height - 1);

        // The block-time floor runs from the round start, so fast consensus
        // waits out the remainder.
        let elapsed = self.now.saturating_sub(self.round_started_at);
        let delay = self.config.block_time.saturating_sub(elapsed);

        vec![
            Action::CancelTimer { id: TimerId::Init },
            Action::CancelTimer { id: TimerId::Sign },
            Action::CancelTimer { id: TimerId::Accept },
            Action::CommitBlock {
                block,
                transactions,
            },
            Action::SetTimer {
                id: TimerId::Propose,
                duration: delay,
            },
        ]
    }

    fn advance_round(&mut self) -> Vec<Action> {
        self.round += 1;
        self.state = BallotState::Init;
        self.proposal = None;
        info!(height = self.height, round = self.round, "round advanced");

        let mut actions = vec![
            Action::CancelTimer { id: TimerId::Init },
            Action::CancelTimer { id: TimerId::Sign },
            Action::CancelTimer { id: TimerId::Accept },
            Action::SetTimer {
                id: TimerId::Init,
                duration: self.config.timeout_init,
            },
        ];
        if self.is_local_proposer() {
            // Fire the propose path immediately; the runner refills it with
            // the pool's current contents.
            actions.push(Action::SetTimer {
                id: TimerId::Propose,
                duration: Duration::ZERO,
            });
        }
        actions
    }
}

impl StateMachine for IsaacState {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::ProposeTimer { available } => self.on_propose_timer(available),
            Event::InitTimeout => self.on_phase_timeout(BallotState::Init),
            Event::SignTimeout => self.on_phase_timeout(BallotState::Sign),
            Event::AcceptTimeout => self.on_phase_timeout(BallotState::Accept),
            Event::ProposalReceived { ballot, vote } => self.on_proposal(ballot, vote),
            Event::BallotReceived { ballot } => self.on_ballot(ballot),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoundRobinSelector;
    use isaac_types::{Amount, Operation, TransactionBody, ValidatorInfo, BASE_FEE};

    const NETWORK_ID: &[u8] = b"test-network";

    fn keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed([seed; 32])
    }

    fn config() -> IsaacConfig {
        IsaacConfig {
            network_id: NETWORK_ID.to_vec(),
            ..IsaacConfig::default()
        }
    }

    fn genesis() -> Block {
        Block::genesis(keypair(99).address(), "0".into()).unwrap()
    }

    /// Three validators wired directly together: broadcast actions are routed
    /// into the other machines until no ballots are in flight.
    struct Cluster {
        nodes: Vec<IsaacState>,
        commits: Vec<Vec<Block>>,
        sync_targets: Vec<Vec<u64>>,
    }

    impl Cluster {
        fn new(n: u8) -> Self {
            let validators = ValidatorSet::new(
                (1..=n)
                    .map(|i| ValidatorInfo {
                        address: keypair(i).address(),
                        endpoint: format!("http://v{i}"),
                    })
                    .collect(),
            );
            let genesis = genesis();
            let nodes = (1..=n)
                .map(|i| {
                    IsaacState::new(
                        keypair(i),
                        validators.clone(),
                        Box::new(RoundRobinSelector),
                        config(),
                        &genesis,
                    )
                    .unwrap()
                })
                .collect::<Vec<_>>();
            Self {
                commits: vec![Vec::new(); n as usize],
                sync_targets: vec![Vec::new(); n as usize],
                nodes,
            }
        }

        fn proposer_index(&self) -> usize {
            let expected = self.nodes[0].expected_proposer();
            self.nodes
                .iter()
                .position(|n| n.local == expected)
                .expect("proposer is in the cluster")
        }

        /// Deliver an event to one node and route resulting broadcasts until
        /// the cluster is quiet.
        fn deliver(&mut self, index: usize, event: Event) {
            let mut queue = vec![(index, event)];
            while let Some((at, event)) = queue.pop() {
                let actions = self.nodes[at].handle(event);
                for action in actions {
                    match action {
                        Action::BroadcastBallot { ballot } => {
                            for (other, _) in self.nodes.iter().enumerate() {
                                if other == at {
                                    continue;
                                }
                                let event = if ballot.state() == BallotState::Init
                                    && ballot.is_from_proposer()
                                {
                                    Event::ProposalReceived {
                                        ballot: ballot.clone(),
                                        vote: Vote::Yes,
                                    }
                                } else {
                                    Event::BallotReceived {
                                        ballot: ballot.clone(),
                                    }
                                };
                                queue.push((other, event));
                            }
                        }
                        Action::CommitBlock { block, .. } => {
                            self.commits[at].push(block);
                        }
                        Action::SetSyncTarget { height } => {
                            self.sync_targets[at].push(height);
                        }
                        Action::SetTimer { .. } | Action::CancelTimer { .. } => {}
                    }
                }
            }
        }
    }

    fn payment_tx(seed: u8) -> Transaction {
        let kp = keypair(seed);
        Transaction::create(
            TransactionBody {
                source: kp.address(),
                fee: BASE_FEE,
                sequence_id: 0,
                operations: vec![Operation::Payment {
                    target: keypair(200).address(),
                    amount: Amount::new(100),
                }],
            },
            &kp,
            NETWORK_ID,
        )
        .unwrap()
    }

    #[test]
    fn empty_validator_set_is_rejected() {
        let result = IsaacState::new(
            keypair(1),
            ValidatorSet::new(vec![]),
            Box::new(RoundRobinSelector),
            config(),
            &genesis(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn three_nodes_commit_one_block() {
        let mut cluster = Cluster::new(3);
        let tx = payment_tx(10);
        let proposer = cluster.proposer_index();

        // Every node's propose tick fires; only the proposer carries pool
        // contents.
        for i in 0..3 {
            let available = if i == proposer { vec![tx.clone()] } else { vec![] };
            cluster.deliver(i, Event::ProposeTimer { available });
        }

        // Later propose ticks may legitimately commit further empty blocks;
        // the first commit everywhere is the block carrying the transaction.
        for (i, commits) in cluster.commits.iter().enumerate() {
            assert!(!commits.is_empty(), "node {i} should have committed");
            assert_eq!(commits[0].height, 2);
            assert_eq!(commits[0].transactions, vec![tx.hash()]);
        }
        // No node committed two different blocks at the same height.
        let hashes: Vec<_> = cluster.commits.iter().map(|c| c[0].hash).collect();
        assert!(hashes.windows(2).all(|w| w[0] == w[1]));
        for node in &cluster.nodes {
            assert!(node.height() >= 3);
            assert_eq!(node.round(), 0);
        }
    }

    #[test]
    fn empty_proposal_commits_without_proposer_transaction() {
        let mut cluster = Cluster::new(3);
        for i in 0..3 {
            cluster.deliver(i, Event::ProposeTimer { available: vec![] });
        }
        for commits in &cluster.commits {
            assert!(!commits.is_empty());
            assert!(commits[0].transactions.is_empty());
            assert!(commits[0].proposer_transaction.is_none());
        }
    }

    #[test]
    fn wrong_proposer_voted_no() {
        let mut cluster = Cluster::new(3);
        let proposer = cluster.proposer_index();
        let wrong = (proposer + 1) % 3;

        // A non-proposer fabricates a proposal for the round.
        let impostor = &mut cluster.nodes[wrong];
        impostor.handle(Event::ProposeTimer { available: vec![] });
        let basis = VotingBasis {
            height: impostor.height(),
            round: impostor.round(),
            block_hash: Hash::from_bytes(b"forged"),
            total_txs: 0,
        };
        let forged = Ballot::create(
            BallotBody {
                basis,
                proposer: impostor.local.clone(),
                signer: impostor.local.clone(),
                state: BallotState::Init,
                vote: Vote::Yes,
                transactions: vec![],
                proposer_transaction: None,
                confirmed: "0".into(),
            },
            &keypair(wrong as u8 + 1),
            NETWORK_ID,
        )
        .unwrap();

        let victim = (proposer + 2) % 3;
        cluster.nodes[victim].handle(Event::ProposeTimer { available: vec![] });
        let actions = cluster.nodes[victim].handle(Event::ProposalReceived {
            ballot: forged,
            vote: Vote::Yes,
        });
        let own = actions.iter().find_map(|a| match a {
            Action::BroadcastBallot { ballot } => Some(ballot.clone()),
            _ => None,
        });
        assert_eq!(own.expect("victim echoes a ballot").vote(), Vote::No);
    }

    #[test]
    fn duplicate_ballot_is_idempotent() {
        let mut cluster = Cluster::new(3);
        let proposer = cluster.proposer_index();
        let non_proposer = (proposer + 1) % 3;

        // Proposer builds its proposal but nothing is routed.
        let actions = cluster.nodes[proposer].handle(Event::ProposeTimer { available: vec![] });
        let proposal = actions
            .iter()
            .find_map(|a| match a {
                Action::BroadcastBallot { ballot } => Some(ballot.clone()),
                _ => None,
            })
            .expect("proposer broadcasts");

        let node = &mut cluster.nodes[non_proposer];
        node.handle(Event::ProposeTimer { available: vec![] });
        let first = node.handle(Event::ProposalReceived {
            ballot: proposal.clone(),
            vote: Vote::Yes,
        });
        assert!(!first.is_empty());
        // The same proposal again: no new broadcast, no transition.
        let replay = node.handle(Event::ProposalReceived {
            ballot: proposal.clone(),
            vote: Vote::Yes,
        });
        assert!(replay.is_empty());
        // And the proposer's INIT ballot replayed as a plain vote changes
        // nothing either.
        let replay = node.handle(Event::BallotReceived { ballot: proposal });
        assert!(replay.is_empty());
    }

    #[test]
    fn height_gap_requests_sync() {
        let mut cluster = Cluster::new(3);
        let far = keypair(2);
        let ballot = Ballot::create(
            BallotBody {
                basis: VotingBasis {
                    height: 25,
                    round: 0,
                    block_hash: Hash::from_bytes(b"far"),
                    total_txs: 40,
                },
                proposer: far.address(),
                signer: far.address(),
                state: BallotState::Sign,
                vote: Vote::Yes,
                transactions: vec![],
                proposer_transaction: None,
                confirmed: "0".into(),
            },
            &far,
            NETWORK_ID,
        )
        .unwrap();
        cluster.deliver(0, Event::ProposeTimer { available: vec![] });
        cluster.deliver(0, Event::BallotReceived { ballot });
        assert_eq!(cluster.sync_targets[0], vec![25]);
    }

    #[test]
    fn expired_round_advances_with_new_proposer() {
        let mut cluster = Cluster::new(3);
        let proposer = cluster.proposer_index();
        let others: Vec<usize> = (0..3).filter(|i| *i != proposer).collect();

        // The proposer crashed: only the other two start their rounds.
        for &i in &others {
            cluster.deliver(i, Event::ProposeTimer { available: vec![] });
        }
        // Their INIT timeouts fire; EXPIRED quorum forms (2 of 3) and the
        // next round's proposer proposes an empty block.
        for &i in &others {
            cluster.deliver(i, Event::InitTimeout);
        }
        for &i in &others {
            cluster.deliver(i, Event::ProposeTimer { available: vec![] });
        }

        for &i in &others {
            assert!(!cluster.commits[i].is_empty(), "node {i} should commit");
            let block = &cluster.commits[i][0];
            assert_eq!(block.height, 2);
            assert!(block.transactions.is_empty());
            assert!(block.proposer_transaction.is_none());
            assert_ne!(cluster.nodes[proposer].local, block.proposer);
        }
    }
}
