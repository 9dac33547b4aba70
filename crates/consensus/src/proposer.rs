//! Proposer selection.

use isaac_types::{Address, ValidatorSet};

/// Picks the validator expected to propose at a given (height, round).
///
/// Every correct node must pick the same proposer, so selection only depends
/// on the sorted validator set and the coordinates. `None` means the set is
/// empty; [`crate::IsaacState`] refuses to construct over one, so consensus
/// never sees that case.
pub trait ProposerSelector: Send + Sync {
    fn select(&self, validators: &ValidatorSet, height: u64, round: u64) -> Option<Address>;
}

/// Default rotation: `validators[(height + round) % n]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinSelector;

impl ProposerSelector for RoundRobinSelector {
    fn select(&self, validators: &ValidatorSet, height: u64, round: u64) -> Option<Address> {
        if validators.is_empty() {
            return None;
        }
        let index = ((height + round) % validators.len() as u64) as usize;
        validators.get(index).map(|v| v.address.clone())
    }
}

/// Always the same proposer. Test fixtures use this to pin rounds.
#[derive(Debug, Clone)]
pub struct FixedSelector {
    pub proposer: Address,
}

impl ProposerSelector for FixedSelector {
    fn select(&self, _validators: &ValidatorSet, _height: u64, _round: u64) -> Option<Address> {
        Some(self.proposer.clone())
    }
}
