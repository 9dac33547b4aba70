//! The vote tally.

use isaac_types::{Address, Ballot, BallotState, Hash, Vote, VotingBasis};
use std::collections::HashMap;
use tracing::trace;

/// Number of validators a YES quorum requires.
///
/// Integer floor: three validators at 67% need two votes, which also lets two
/// EXPIRED votes of three advance a round.
pub fn threshold_count(n: usize, threshold_pct: u64) -> usize {
    ((n as u64 * threshold_pct) / 100).max(1) as usize
}

/// The outcome of a tally once it is conclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// YES votes on the basis reached the threshold.
    Yes,
    /// YES can no longer be reached.
    No,
    /// EXPIRED votes reached the threshold; the round is abandoned.
    Expired,
}

/// Vote counts for one basis in one phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub yes: usize,
    pub no: usize,
    pub expired: usize,
}

/// Per-(height, round, phase) record of who voted what.
///
/// One vote per signer per slot: the first recorded vote wins and replays are
/// no-ops, which makes ballot application idempotent. YES/NO are counted
/// against the block hash they name; EXPIRED counts for the whole round, since
/// a validator that never saw the proposal votes EXPIRED on a basis carrying
/// its own latest block hash.
#[derive(Debug, Default)]
pub struct VotingBox {
    rounds: HashMap<(u64, u64, BallotState), HashMap<Address, (Vote, Hash)>>,
}

impl VotingBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a ballot. Returns false if this signer already voted in the
    /// slot (the existing vote is kept).
    pub fn record(&mut self, ballot: &Ballot) -> bool {
        // NOTYET is a tally placeholder, never a recordable vote.
        if ballot.vote() == Vote::NotYet {
            return false;
        }
        let basis = ballot.basis();
        let slot = self
            .rounds
            .entry((basis.height, basis.round, ballot.state()))
            .or_default();
        match slot.get(ballot.signer()) {
            Some(_) => {
                trace!(signer = ?ballot.signer(), state = %ballot.state(), "duplicate ballot ignored");
                false
            }
            None => {
                slot.insert(
                    ballot.signer().clone(),
                    (ballot.vote(), basis.block_hash),
                );
                true
            }
        }
    }

    /// Count votes for `basis` in `state`.
    pub fn tally(&self, basis: &VotingBasis, state: BallotState) -> Tally {
        let mut tally = Tally::default();
        let Some(slot) = self.rounds.get(&(basis.height, basis.round, state)) else {
            return tally;
        };
        for (vote, hash) in slot.values() {
            match vote {
                Vote::Yes if *hash == basis.block_hash => tally.yes += 1,
                Vote::No if *hash == basis.block_hash => tally.no += 1,
                Vote::Expired => tally.expired += 1,
                _ => {}
            }
        }
        tally
    }

    /// Whether the tally for `basis` in `state` is conclusive.
    pub fn decide(
        &self,
        basis: &VotingBasis,
        state: BallotState,
        validators: usize,
        threshold_pct: u64,
    ) -> Option<Decision> {
        let tally = self.tally(basis, state);
        let threshold = threshold_count(validators, threshold_pct);
        if tally.yes >= threshold {
            return Some(Decision::Yes);
        }
        if tally.expired >= threshold {
            return Some(Decision::Expired);
        }
        // NO the moment YES is unreachable.
        if tally.no + tally.expired >= validators - threshold + 1 {
            return Some(Decision::No);
        }
        None
    }

    /// Drop every slot at or below `height`; those rounds are settled.
    pub fn prune_below(&mut self, height: u64) {
        self.rounds.retain(|(h, _, _), _| *h > height);
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}
