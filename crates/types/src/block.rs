//! Blocks.

use crate::{Address, Hash, ProposerTransaction};
use serde::{Deserialize, Serialize};

/// One agreed position in the chain.
///
/// `hash` is the SHA-256 of the canonical encoding of every other field, so
/// two nodes that stored the same block stored the same bytes. `total_txs` is
/// cumulative over the whole chain, which pins the chain position into the
/// voting basis as well as the block content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub prev_hash: Hash,
    pub proposer: Address,
    /// Hashes of the included transactions, in proposal order.
    pub transactions: Vec<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposer_transaction: Option<ProposerTransaction>,
    pub total_txs: u64,
    /// Proposer-recorded confirmation timestamp (milliseconds since the Unix
    /// epoch, as a string).
    pub confirmed: String,
    pub hash: Hash,
}

/// The fields a block hash covers, in encoding order.
#[derive(Serialize)]
struct BlockDigest<'a> {
    height: u64,
    prev_hash: &'a Hash,
    proposer: &'a Address,
    transactions: &'a [Hash],
    proposer_transaction: &'a Option<ProposerTransaction>,
    total_txs: u64,
    confirmed: &'a str,
}

impl Block {
    /// Height of the genesis block. Heights are 1-based.
    pub const GENESIS_HEIGHT: u64 = 1;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        height: u64,
        prev_hash: Hash,
        proposer: Address,
        transactions: Vec<Hash>,
        proposer_transaction: Option<ProposerTransaction>,
        total_txs: u64,
        confirmed: String,
    ) -> Result<Self, serde_json::Error> {
        let hash = Self::compute_hash(
            height,
            &prev_hash,
            &proposer,
            &transactions,
            &proposer_transaction,
            total_txs,
            &confirmed,
        )?;
        Ok(Self {
            height,
            prev_hash,
            proposer,
            transactions,
            proposer_transaction,
            total_txs,
            confirmed,
            hash,
        })
    }

    /// The first block of a chain: height 1, zero previous hash, no payload.
    pub fn genesis(proposer: Address, confirmed: String) -> Result<Self, serde_json::Error> {
        Self::new(
            Self::GENESIS_HEIGHT,
            Hash::ZERO,
            proposer,
            Vec::new(),
            None,
            0,
            confirmed,
        )
    }

    fn compute_hash(
        height: u64,
        prev_hash: &Hash,
        proposer: &Address,
        transactions: &[Hash],
        proposer_transaction: &Option<ProposerTransaction>,
        total_txs: u64,
        confirmed: &str,
    ) -> Result<Hash, serde_json::Error> {
        let digest = BlockDigest {
            height,
            prev_hash,
            proposer,
            transactions,
            proposer_transaction,
            total_txs,
            confirmed,
        };
        Ok(Hash::from_bytes(&serde_json::to_vec(&digest)?))
    }

    /// Recompute the hash from the stored fields and compare. Used when a
    /// block arrives from an untrusted peer.
    pub fn verify_hash(&self) -> Result<bool, serde_json::Error> {
        let recomputed = Self::compute_hash(
            self.height,
            &self.prev_hash,
            &self.proposer,
            &self.transactions,
            &self.proposer_transaction,
            self.total_txs,
            &self.confirmed,
        )?;
        Ok(recomputed == self.hash)
    }
}
