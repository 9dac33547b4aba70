//! The known validator set.

use crate::Address;
use serde::{Deserialize, Serialize};

/// One known validator: its address and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub address: Address,
    /// Network endpoint for unicast and block fetches.
    pub endpoint: String,
}

/// The permissioned set of validators whose votes count toward quorum.
///
/// Kept sorted by address so proposer rotation is identical on every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: Vec<ValidatorInfo>,
}

impl ValidatorSet {
    pub fn new(mut validators: Vec<ValidatorInfo>) -> Self {
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        validators.dedup_by(|a, b| a.address == b.address);
        Self { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.validators.iter().any(|v| &v.address == address)
    }

    pub fn get(&self, index: usize) -> Option<&ValidatorInfo> {
        self.validators.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatorInfo> {
        self.validators.iter()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.validators.iter().map(|v| &v.address)
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.validators.iter().map(|v| v.endpoint.clone()).collect()
    }

    /// Endpoints of everyone but `local`; the peers a node syncs from.
    pub fn peer_endpoints(&self, local: &Address) -> Vec<String> {
        self.validators
            .iter()
            .filter(|v| &v.address != local)
            .map(|v| v.endpoint.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    fn info(seed: u8) -> ValidatorInfo {
        ValidatorInfo {
            address: KeyPair::from_seed([seed; 32]).address(),
            endpoint: format!("http://validator-{seed}.local"),
        }
    }

    #[test]
    fn sorted_and_deduped() {
        let a = info(1);
        let b = info(2);
        let set = ValidatorSet::new(vec![b.clone(), a.clone(), b.clone()]);
        assert_eq!(set.len(), 2);
        let ordered: Vec<_> = set.addresses().cloned().collect();
        let mut expected = vec![a.address.clone(), b.address.clone()];
        expected.sort();
        assert_eq!(ordered, expected);
    }

    #[test]
    fn peer_endpoints_excludes_local() {
        let a = info(1);
        let b = info(2);
        let set = ValidatorSet::new(vec![a.clone(), b.clone()]);
        let peers = set.peer_endpoints(&a.address);
        assert_eq!(peers, vec![b.endpoint]);
    }
}
