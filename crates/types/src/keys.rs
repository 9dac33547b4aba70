//! Ed25519 key wrappers.
//!
//! Thin adapters over `ed25519_dalek`, exposing only what the protocol needs:
//! signing, verification, and the address form of a public key. Addresses are
//! the hex encoding of the 32-byte public key, so a signer's key can always be
//! recovered from its address.

use ed25519_dalek as ed;
use ed25519_dalek::{Signer as _, Verifier as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A validator or account address: hex-encoded Ed25519 public key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

/// Errors from key material handling.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid address encoding")]
    InvalidAddress,
    #[error("invalid key material")]
    InvalidKey,
    #[error("invalid signature")]
    InvalidSignature,
}

impl Address {
    /// Recover the public key this address encodes.
    pub fn public_key(&self) -> Result<PublicKey, KeyError> {
        let bytes = hex::decode(&self.0).map_err(|_| KeyError::InvalidAddress)?;
        let arr: [u8; ed::PUBLIC_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidAddress)?;
        let key = ed::VerifyingKey::from_bytes(&arr).map_err(|_| KeyError::InvalidKey)?;
        Ok(PublicKey(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..", &self.0[..self.0.len().min(8)])
    }
}

/// Signing keypair held by the local node.
#[derive(Clone)]
pub struct KeyPair(ed::SigningKey);

impl KeyPair {
    /// Generate a keypair from the OS entropy source.
    pub fn generate() -> Self {
        Self(ed::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Deterministic keypair from a 32-byte seed. Test fixtures only need
    /// stable addresses, not secrecy.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(ed::SigningKey::from_bytes(&seed))
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.0.sign(msg))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(ed::VerifyingKey::from(&self.0))
    }

    pub fn address(&self) -> Address {
        self.public_key().address()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyPair").field(&self.address()).finish()
    }
}

/// Ed25519 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(ed::VerifyingKey);

impl PublicKey {
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), KeyError> {
        self.0
            .verify(msg, &sig.0)
            .map_err(|_| KeyError::InvalidSignature)
    }

    pub fn address(&self) -> Address {
        Address(hex::encode(self.0.as_bytes()))
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.address()).finish()
    }
}

/// Ed25519 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed::Signature);

impl Signature {
    pub fn to_bytes(&self) -> [u8; ed::SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: &[u8; ed::SIGNATURE_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self(ed::Signature::from_bytes(arr)))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}..)", &hex::encode(self.to_bytes())[..8])
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Signature::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
