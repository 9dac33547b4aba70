//! Ledger accounts.

use crate::{Address, Amount};
use serde::{Deserialize, Serialize};

/// A ledger account, keyed by address.
///
/// `linked` is set on frozen accounts and names the parent account the frozen
/// funds belong to. Frozen accounts follow restricted withdrawal rules: a
/// payment out must drain the whole balance minus the base fee, and only after
/// the unfreezing period has elapsed since an unfreeze request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: Amount,
    pub sequence_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked: Option<Address>,
}

impl Account {
    pub fn new(address: Address, balance: Amount) -> Self {
        Self {
            address,
            balance,
            sequence_id: 0,
            linked: None,
        }
    }

    pub fn new_linked(address: Address, balance: Amount, linked: Address) -> Self {
        Self {
            address,
            balance,
            sequence_id: 0,
            linked: Some(linked),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.linked.is_some()
    }
}

/// Balance snapshot of an account at a given sequence id.
///
/// Written on every successful application of a transaction from that source;
/// validation checks "sufficient balance at the sequence the transaction
/// references" against these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub address: Address,
    pub sequence_id: u64,
    pub balance: Amount,
}
