//! Node configuration.

use isaac_consensus::IsaacConfig;
use isaac_sync::SyncConfig;

/// Everything a node is configured with. Consensus and sync carry their own
/// sections; the rate limits parameterize the two HTTP surfaces served
/// outside the core.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub consensus: IsaacConfig,
    pub sync: SyncConfig,

    /// Per-IP token-bucket rate for the public API surface, requests/second.
    pub rate_limit_api: u64,
    /// Per-IP token-bucket rate for the node-to-node surface,
    /// requests/second.
    pub rate_limit_node: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            consensus: IsaacConfig::default(),
            sync: SyncConfig::default(),
            rate_limit_api: 100,
            rate_limit_node: 100,
        }
    }
}

impl NodeConfig {
    pub fn with_network_id(network_id: impl Into<Vec<u8>>) -> Self {
        Self {
            consensus: IsaacConfig {
                network_id: network_id.into(),
                ..IsaacConfig::default()
            },
            ..Self::default()
        }
    }
}
