//! Transactions and the proposer transaction.

use crate::{Address, Amount, AmountError, Hash, KeyError, KeyPair, Operation, Signature, BASE_FEE};
use serde::{Deserialize, Serialize};

/// Domain separator for signatures; every network signs over its own id so
/// messages cannot be replayed across networks.
pub type NetworkId = Vec<u8>;

/// Reasons a transaction fails the well-formedness check.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction has no operations")]
    EmptyOperations,
    #[error("transaction has {0} operations, limit is {1}")]
    TooManyOperations(usize, usize),
    #[error("fee {0} is below the base fee")]
    FeeBelowBase(Amount),
    #[error("stated hash does not match the body")]
    HashMismatch,
    #[error(transparent)]
    BadSignature(#[from] KeyError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Signed transaction header: the content hash plus the source's signature
/// over `network_id ‖ hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub hash: Hash,
    pub signature: Signature,
}

/// The signed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub source: Address,
    pub fee: Amount,
    pub sequence_id: u64,
    pub operations: Vec<Operation>,
}

impl TransactionBody {
    /// Canonical content hash: SHA-256 of the JSON encoding.
    pub fn hash(&self) -> Result<Hash, serde_json::Error> {
        Ok(Hash::from_bytes(&serde_json::to_vec(self)?))
    }
}

/// A transfer of value signed by its source account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "H")]
    pub header: TransactionHeader,
    #[serde(rename = "B")]
    pub body: TransactionBody,
}

impl Transaction {
    /// Hash and sign `body` with the source's keypair.
    pub fn create(
        body: TransactionBody,
        keypair: &KeyPair,
        network_id: &[u8],
    ) -> Result<Self, TransactionError> {
        let hash = body.hash()?;
        let signature = keypair.sign(&signing_payload(network_id, &hash));
        Ok(Self {
            header: TransactionHeader { hash, signature },
            body,
        })
    }

    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    pub fn source(&self) -> &Address {
        &self.body.source
    }

    pub fn fee(&self) -> Amount {
        self.body.fee
    }

    pub fn sequence_id(&self) -> u64 {
        self.body.sequence_id
    }

    pub fn operations(&self) -> &[Operation] {
        &self.body.operations
    }

    /// Sum of all operation amounts, optionally including the fee.
    pub fn total_amount(&self, with_fee: bool) -> Result<Amount, AmountError> {
        let ops: Result<Amount, AmountError> =
            self.body.operations.iter().map(|op| op.amount()).sum();
        let total = ops?;
        if with_fee {
            total.add(self.body.fee)
        } else {
            Ok(total)
        }
    }

    /// Whether `sequence_id` matches the account's current sequence.
    pub fn is_valid_sequence_id(&self, account_sequence_id: u64) -> bool {
        self.body.sequence_id == account_sequence_id
    }

    /// Structural validity: field ranges, hash integrity, and the source's
    /// signature. Semantic validation against the ledger happens separately.
    pub fn is_well_formed(
        &self,
        network_id: &[u8],
        ops_limit: usize,
    ) -> Result<(), TransactionError> {
        if self.body.operations.is_empty() {
            return Err(TransactionError::EmptyOperations);
        }
        if self.body.operations.len() > ops_limit {
            return Err(TransactionError::TooManyOperations(
                self.body.operations.len(),
                ops_limit,
            ));
        }
        if self.body.fee < BASE_FEE {
            return Err(TransactionError::FeeBelowBase(self.body.fee));
        }
        if self.body.hash()? != self.header.hash {
            return Err(TransactionError::HashMismatch);
        }
        // The total must be computable without overflow.
        self.total_amount(true)?;
        let key = self.body.source.public_key()?;
        key.verify(
            &signing_payload(network_id, &self.header.hash),
            &self.header.signature,
        )?;
        Ok(())
    }
}

/// The message bytes a header signature covers.
pub fn signing_payload(network_id: &[u8], hash: &Hash) -> Vec<u8> {
    let mut payload = Vec::with_capacity(network_id.len() + 32);
    payload.extend_from_slice(network_id);
    payload.extend_from_slice(hash.as_bytes());
    payload
}

/// The proposer's own transaction in a ballot: one CollectTxFee operation
/// summing the fees of every included transaction. Absent for rounds that
/// expired without a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerTransaction {
    pub proposer: Address,
    /// Collected fee total; must equal the sum of included transaction fees.
    pub collected: Amount,
    /// Number of transactions the fees were collected from.
    pub committed_txs: u64,
    pub block_height: u64,
}

impl ProposerTransaction {
    pub fn collect(
        proposer: Address,
        fees: impl IntoIterator<Item = Amount>,
        committed_txs: u64,
        block_height: u64,
    ) -> Result<Self, AmountError> {
        let collected: Result<Amount, AmountError> = fees.into_iter().sum();
        Ok(Self {
            proposer,
            collected: collected?,
            committed_txs,
            block_height,
        })
    }
}
