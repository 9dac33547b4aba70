//! Event types for the deterministic state machine.

use isaac_types::{Ballot, Transaction, Vote};

/// All possible inputs to the consensus state machine.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
///
/// Network messages are pre-checked by the runner before they become events:
/// signatures verified, signers matched against the validator set, and - for a
/// proposer's INIT ballot - the ballot transaction chain already run, its
/// outcome carried as `vote`.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// The block-time floor elapsed; start the round at the current height.
    /// Carries the pool's available transactions, drained by the runner at
    /// fire time, in case this node is the round's proposer.
    ProposeTimer { available: Vec<Transaction> },

    /// The INIT phase timed out without a quorum.
    InitTimeout,

    /// The SIGN phase timed out without a quorum.
    SignTimeout,

    /// The ACCEPT phase timed out without a quorum.
    AcceptTimeout,

    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// The round proposer's INIT ballot, together with the outcome of the
    /// ballot transaction chain: YES when every referenced transaction is
    /// present and valid, NO otherwise.
    ProposalReceived { ballot: Ballot, vote: Vote },

    /// A voting ballot from a validator (INIT echoes, SIGN, ACCEPT).
    BallotReceived { ballot: Ballot },
}

impl Event {
    /// Event type name for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ProposeTimer { .. } => "ProposeTimer",
            Event::InitTimeout => "InitTimeout",
            Event::SignTimeout => "SignTimeout",
            Event::AcceptTimeout => "AcceptTimeout",
            Event::ProposalReceived { .. } => "ProposalReceived",
            Event::BallotReceived { .. } => "BallotReceived",
        }
    }
}
