//! Block fetch protocol for catch-up sync.

use isaac_types::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// Ask a peer for the block at `height` and its transaction bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlockRequest {
    pub height: u64,
}

/// A peer's answer to [`GetBlockRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlockResponse {
    pub block: Block,
    /// Full bodies of every hash in `block.transactions`, in block order.
    pub transactions: Vec<Transaction>,
}
