//! The node-to-node wire envelope.

use isaac_types::{
    Ballot, BallotBody, BallotHeader, Transaction, TransactionBody, TransactionHeader,
};
use serde::{Deserialize, Serialize};

/// Every peer message is `{T, H, B}`: a kind tag, a header carrying the body
/// hash and signature, and the body itself, as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "T")]
pub enum NetworkMessage {
    Transaction {
        #[serde(rename = "H")]
        header: TransactionHeader,
        #[serde(rename = "B")]
        body: TransactionBody,
    },
    Ballot {
        #[serde(rename = "H")]
        header: BallotHeader,
        #[serde(rename = "B")]
        body: BallotBody,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("malformed network message: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

impl NetworkMessage {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NetworkMessage::Transaction { .. } => "Transaction",
            NetworkMessage::Ballot { .. } => "Ballot",
        }
    }
}

impl From<Transaction> for NetworkMessage {
    fn from(tx: Transaction) -> Self {
        NetworkMessage::Transaction {
            header: tx.header,
            body: tx.body,
        }
    }
}

impl From<Ballot> for NetworkMessage {
    fn from(ballot: Ballot) -> Self {
        NetworkMessage::Ballot {
            header: ballot.header,
            body: ballot.body,
        }
    }
}

impl NetworkMessage {
    /// The transaction this message carries, if it is one.
    pub fn into_transaction(self) -> Option<Transaction> {
        match self {
            NetworkMessage::Transaction { header, body } => {
                Some(Transaction { header, body })
            }
            _ => None,
        }
    }

    /// The ballot this message carries, if it is one.
    pub fn into_ballot(self) -> Option<Ballot> {
        match self {
            NetworkMessage::Ballot { header, body } => Some(Ballot { header, body }),
            _ => None,
        }
    }
}
