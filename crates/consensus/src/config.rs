//! Consensus configuration.

use std::time::Duration;

/// Tunables of the ballot state machine.
#[derive(Debug, Clone)]
pub struct IsaacConfig {
    /// Domain separator for every signature on this network.
    pub network_id: Vec<u8>,

    /// Percent of the validator set required for a YES quorum.
    pub threshold: u64,

    /// Maximum transactions packed into one proposal.
    pub txs_limit: usize,

    /// Maximum operations per transaction.
    pub ops_limit: usize,

    /// Timeout of the INIT phase.
    pub timeout_init: Duration,
    /// Timeout of the SIGN phase.
    pub timeout_sign: Duration,
    /// Timeout of the ACCEPT phase.
    pub timeout_accept: Duration,

    /// Floor between successive block commits. The next round does not start
    /// before this much time has passed, even when consensus is faster.
    pub block_time: Duration,

    /// Block-height delta that must pass after an unfreeze request before the
    /// paired withdrawal may execute.
    pub unfreezing_period: u64,
}

impl Default for IsaacConfig {
    fn default() -> Self {
        Self {
            network_id: b"isaac-network".to_vec(),
            threshold: 67,
            txs_limit: 1_000,
            ops_limit: 1_000,
            timeout_init: Duration::from_secs(2),
            timeout_sign: Duration::from_secs(2),
            timeout_accept: Duration::from_secs(2),
            block_time: Duration::from_secs(5),
            unfreezing_period: 241_920,
        }
    }
}

impl IsaacConfig {
    /// Timeout of the given phase.
    pub fn timeout_of(&self, state: isaac_types::BallotState) -> Duration {
        match state {
            isaac_types::BallotState::Init => self.timeout_init,
            isaac_types::BallotState::Sign => self.timeout_sign,
            isaac_types::BallotState::Accept => self.timeout_accept,
        }
    }
}
