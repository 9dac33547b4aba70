//! Core types for the ISAAC consensus node.
//!
//! This crate provides the foundational types used throughout the node:
//!
//! - **Primitives**: [`Hash`], Ed25519 key wrappers, [`Amount`]
//! - **Ledger**: [`Account`], [`AccountSnapshot`], [`Operation`],
//!   [`Transaction`], [`Block`]
//! - **Consensus**: [`Ballot`], [`BallotState`], [`Vote`], [`VotingBasis`],
//!   [`ValidatorSet`]
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crate, making it the foundation layer. Hashing and signing use the
//! canonical JSON encoding of each body; signatures are domain-separated by
//! the network id.

mod account;
mod amount;
mod ballot;
mod block;
mod hash;
mod keys;
mod operation;
mod transaction;
mod validator;

pub use account::{Account, AccountSnapshot};
pub use amount::{Amount, AmountError, BASE_FEE, UNIT};
pub use ballot::{Ballot, BallotBody, BallotError, BallotHeader, BallotState, Vote, VotingBasis};
pub use block::Block;
pub use hash::{Hash, HexError};
pub use keys::{Address, KeyError, KeyPair, PublicKey, Signature};
pub use operation::{Operation, OperationKind};
pub use transaction::{
    signing_payload, NetworkId, ProposerTransaction, Transaction, TransactionBody,
    TransactionError, TransactionHeader,
};
pub use validator::{ValidatorInfo, ValidatorSet};
