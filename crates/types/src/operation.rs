//! Transaction operations.

use crate::{Address, Amount};
use serde::{Deserialize, Serialize};

/// One operation inside a transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    /// Create `target` funded with `amount` from the source. When `linked` is
    /// set, the created account is frozen and owned by `linked`.
    CreateAccount {
        target: Address,
        amount: Amount,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        linked: Option<Address>,
    },
    /// Transfer `amount` from the source to `target`.
    Payment { target: Address, amount: Amount },
    /// Announce intent to withdraw from a frozen source. Starts the
    /// unfreezing period.
    UnfreezeRequest,
    CongressVoting,
    CongressVotingResult,
}

/// Discriminant of an [`Operation`], stored with block operation records so
/// the frozen-account rules can inspect an account's operation history without
/// decoding full bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    CreateAccount,
    Payment,
    UnfreezeRequest,
    CongressVoting,
    CongressVotingResult,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateAccount { .. } => OperationKind::CreateAccount,
            Operation::Payment { .. } => OperationKind::Payment,
            Operation::UnfreezeRequest => OperationKind::UnfreezeRequest,
            Operation::CongressVoting => OperationKind::CongressVoting,
            Operation::CongressVotingResult => OperationKind::CongressVotingResult,
        }
    }

    /// The funds this operation moves out of the source account.
    pub fn amount(&self) -> Amount {
        match self {
            Operation::CreateAccount { amount, .. } | Operation::Payment { amount, .. } => *amount,
            _ => Amount::ZERO,
        }
    }

    pub fn target(&self) -> Option<&Address> {
        match self {
            Operation::CreateAccount { target, .. } | Operation::Payment { target, .. } => {
                Some(target)
            }
            _ => None,
        }
    }
}
