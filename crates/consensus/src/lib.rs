//! ISAAC ballot consensus.
//!
//! This crate provides the synchronous consensus state machine and its
//! supporting pieces:
//!
//! - [`IsaacState`]: the INIT → SIGN → ACCEPT ballot state machine
//! - [`VotingBox`]: the per-(height, round, phase) vote tally
//! - [`ProposerSelector`]: pluggable proposer rotation
//! - [`IsaacConfig`]: thresholds, limits, and timeouts
//!
//! All I/O is performed by the node runner via returned
//! [`isaac_core::Action`]s.
//!
//! # Safety
//!
//! - One vote per signer per (height, round, phase); replays are no-ops.
//! - A YES quorum requires the configured threshold fraction of the whole
//!   validator set, so two conflicting quorums cannot both form below the
//!   Byzantine bound.
//! - A proposal from anyone but the round's expected proposer is voted NO
//!   regardless of content.
//!
//! # Liveness
//!
//! - Each phase runs a timeout; expiry broadcasts an EXPIRED vote and an
//!   EXPIRED quorum abandons the round for (height, round + 1).
//! - A NO decision (YES no longer reachable) advances the round the same way.

mod config;
mod proposer;
mod state;
mod voting_box;

pub use config::IsaacConfig;
pub use proposer::{FixedSelector, ProposerSelector, RoundRobinSelector};
pub use state::{EmptyValidatorSet, IsaacState};
pub use voting_box::{threshold_count, Decision, Tally, VotingBox};
