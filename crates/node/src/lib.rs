//! The validator node.
//!
//! Ties the core together: incoming network messages split by kind, with
//! transactions running the ingress checker chain into the pool and ballots
//! running the ballot checks into the consensus state machine; the runner
//! executes the machine's actions and hands height gaps to the sync engine.
//!
//! The pieces:
//!
//! - [`run_tx_chain`] / [`audit_proposal`]: the two checker chains
//! - [`ConnectionManager`]: abstract broadcast/unicast; [`ChannelHub`] wires
//!   nodes together in-process for tests
//! - [`TimerManager`]: tokio-task timers keyed by [`isaac_core::TimerId`]
//! - [`NodeRunner`]: the event loop
//! - [`NodeConfig`]: every knob in one place

mod ballot_checker;
mod checker;
mod config;
mod error;
pub mod metrics;
mod network;
mod runner;
mod timers;
mod tx_checker;

pub use ballot_checker::{
    audit_proposal, check_ballot, run_ballot_tx_stage, BallotTxContext, BallotTxStage,
    BALLOT_TX_CHAIN,
};
pub use checker::{run_chain, StageOutcome};
pub use config::NodeConfig;
pub use error::NodeError;
pub use network::{ChannelConnection, ChannelHub, ConnectionManager};
pub use runner::{serve_block, NodeRunner};
pub use timers::TimerManager;
pub use tx_checker::{run_tx_chain, run_tx_stage, TxContext, TxStage, TX_CHAIN};
