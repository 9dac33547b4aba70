//! Action types returned by the state machine.

use crate::TimerId;
use isaac_types::{Ballot, Block, Hash};
use std::time::Duration;

/// All possible outputs from the consensus state machine.
///
/// Actions are **instructions to the runner** - the state machine performs no
/// I/O itself. The runner executes each action in order.
#[derive(Debug, Clone)]
pub enum Action {
    /// Schedule a timer. Replaces any existing timer with the same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a timer. No-op if it is not running.
    CancelTimer { id: TimerId },

    /// Broadcast a ballot to every known validator.
    BroadcastBallot { ballot: Ballot },

    /// Persist the decided block, prune `transactions` from the pool, and
    /// notify block-height waiters.
    CommitBlock {
        block: Block,
        transactions: Vec<Hash>,
    },

    /// A ballot revealed the network is ahead of us; hand the target height
    /// to the sync engine together with the known peer set.
    SetSyncTarget { height: u64 },
}
