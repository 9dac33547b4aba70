//! Node-level error taxonomy.

use isaac_storage::{StorageError, ValidationError};
use isaac_types::{BallotError, TransactionError};

/// Everything a checker chain or the runner can reject a message for.
///
/// [`KnownMessage`](NodeError::KnownMessage) is a sentinel, not a failure:
/// the message has been seen before and needs no further action. Callers
/// check [`is_known`](NodeError::is_known) before treating an error as a
/// rejection.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("message is known, no further action")]
    KnownMessage,
    #[error("another transaction from this source is already pending")]
    SameSource,
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("ballot signer is not a known validator")]
    UnknownSigner,
    #[error("collected fee does not match the included transactions")]
    InvalidFee,
    #[error("transaction not found in the pool")]
    TransactionNotFound,
    #[error("chain has no genesis block")]
    EmptyChain,
    #[error(transparent)]
    EmptyValidatorSet(#[from] isaac_consensus::EmptyValidatorSet),
    #[error(transparent)]
    Amount(#[from] isaac_types::AmountError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Ballot(#[from] BallotError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl NodeError {
    /// True for the duplicate sentinel: drop silently, not an error.
    pub fn is_known(&self) -> bool {
        matches!(self, NodeError::KnownMessage)
    }
}
