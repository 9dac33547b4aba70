//! Consensus ballots.

use crate::{
    signing_payload, Address, Hash, KeyError, KeyPair, ProposerTransaction, Signature,
};
use serde::{Deserialize, Serialize};

/// The three voting phases a round passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BallotState {
    Init,
    Sign,
    Accept,
}

impl BallotState {
    /// The phase after this one, or `None` after ACCEPT.
    pub fn next(&self) -> Option<BallotState> {
        match self {
            BallotState::Init => Some(BallotState::Sign),
            BallotState::Sign => Some(BallotState::Accept),
            BallotState::Accept => None,
        }
    }
}

impl std::fmt::Display for BallotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BallotState::Init => "INIT",
            BallotState::Sign => "SIGN",
            BallotState::Accept => "ACCEPT",
        };
        f.write_str(s)
    }
}

/// A validator's position on a basis in one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vote {
    Yes,
    No,
    /// The phase timed out locally; vote to abandon the round.
    Expired,
    /// No position yet. Never broadcast; the initial tally state.
    NotYet,
}

/// Identity of what is being voted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VotingBasis {
    pub height: u64,
    pub round: u64,
    pub block_hash: Hash,
    pub total_txs: u64,
}

/// The signed portion of a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotBody {
    pub basis: VotingBasis,
    /// The validator expected to have proposed this round's block.
    pub proposer: Address,
    /// The validator casting this ballot.
    pub signer: Address,
    pub state: BallotState,
    pub vote: Vote,
    /// Hashes of the proposed transactions. Carried on every ballot so a
    /// late-joining tally can reconstruct what was proposed.
    pub transactions: Vec<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposer_transaction: Option<ProposerTransaction>,
    /// The proposer's confirmation timestamp for the proposed block. Needed
    /// so every validator rebuilds the exact block the basis hash names.
    pub confirmed: String,
}

impl BallotBody {
    pub fn hash(&self) -> Result<Hash, serde_json::Error> {
        Ok(Hash::from_bytes(&serde_json::to_vec(self)?))
    }
}

/// Errors verifying a received ballot.
#[derive(Debug, thiserror::Error)]
pub enum BallotError {
    #[error("stated hash does not match the body")]
    HashMismatch,
    #[error(transparent)]
    BadSignature(#[from] KeyError),
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A signed consensus message: a proposal or a vote on one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "H")]
    pub header: BallotHeader,
    #[serde(rename = "B")]
    pub body: BallotBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotHeader {
    pub hash: Hash,
    pub signature: Signature,
}

impl Ballot {
    /// Hash and sign `body` with the signer's keypair.
    pub fn create(
        body: BallotBody,
        keypair: &KeyPair,
        network_id: &[u8],
    ) -> Result<Self, BallotError> {
        let hash = body.hash()?;
        let signature = keypair.sign(&signing_payload(network_id, &hash));
        Ok(Self {
            header: BallotHeader { hash, signature },
            body,
        })
    }

    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    pub fn basis(&self) -> &VotingBasis {
        &self.body.basis
    }

    pub fn signer(&self) -> &Address {
        &self.body.signer
    }

    pub fn state(&self) -> BallotState {
        self.body.state
    }

    pub fn vote(&self) -> Vote {
        self.body.vote
    }

    /// Whether this ballot was cast by the round's proposer itself.
    pub fn is_from_proposer(&self) -> bool {
        self.body.signer == self.body.proposer
    }

    /// Check hash integrity and the signer's signature.
    pub fn verify(&self, network_id: &[u8]) -> Result<(), BallotError> {
        if self.body.hash()? != self.header.hash {
            return Err(BallotError::HashMismatch);
        }
        let key = self.body.signer.public_key()?;
        key.verify(
            &signing_payload(network_id, &self.header.hash),
            &self.header.signature,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORK_ID: &[u8] = b"test-network";

    fn basis() -> VotingBasis {
        VotingBasis {
            height: 2,
            round: 0,
            block_hash: Hash::from_bytes(b"proposal"),
            total_txs: 0,
        }
    }

    #[test]
    fn sign_and_verify() {
        let kp = KeyPair::from_seed([4u8; 32]);
        let ballot = Ballot::create(
            BallotBody {
                basis: basis(),
                proposer: kp.address(),
                signer: kp.address(),
                state: BallotState::Init,
                vote: Vote::Yes,
                transactions: vec![],
                proposer_transaction: None,
                confirmed: String::new(),
            },
            &kp,
            NETWORK_ID,
        )
        .unwrap();
        assert!(ballot.verify(NETWORK_ID).is_ok());
        assert!(ballot.is_from_proposer());
    }

    #[test]
    fn forged_signer_rejected() {
        let kp = KeyPair::from_seed([4u8; 32]);
        let other = KeyPair::from_seed([5u8; 32]);
        let mut ballot = Ballot::create(
            BallotBody {
                basis: basis(),
                proposer: kp.address(),
                signer: kp.address(),
                state: BallotState::Init,
                vote: Vote::Yes,
                transactions: vec![],
                proposer_transaction: None,
                confirmed: String::new(),
            },
            &kp,
            NETWORK_ID,
        )
        .unwrap();
        // Claiming another signer changes the body, so either the hash check
        // or the signature check must fail.
        ballot.body.signer = other.address();
        assert!(ballot.verify(NETWORK_ID).is_err());
    }

    #[test]
    fn state_ordering() {
        assert_eq!(BallotState::Init.next(), Some(BallotState::Sign));
        assert_eq!(BallotState::Sign.next(), Some(BallotState::Accept));
        assert_eq!(BallotState::Accept.next(), None);
    }
}
