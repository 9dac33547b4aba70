//! Block fetching from peers.

use crate::SyncConfig;
use async_trait::async_trait;
use isaac_messages::GetBlockResponse;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Transport used to request a block from one peer. The production transport
/// lives outside the core; tests plug in channel- or map-backed fakes.
#[async_trait]
pub trait BlockFetchClient: Send + Sync {
    async fn fetch_block(&self, peer: &str, height: u64) -> Result<GetBlockResponse, FetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("peer has no block at height {0}")]
    NotFound(u64),
    #[error("invalid response: {0}")]
    Invalid(String),
}

/// Fetches one height at a time, rotating peers and backing off on failure.
#[derive(Clone)]
pub struct BlockFetcher {
    client: Arc<dyn BlockFetchClient>,
    fetch_timeout: Duration,
    retry_interval: Duration,
}

impl BlockFetcher {
    pub fn new(client: Arc<dyn BlockFetchClient>, config: &SyncConfig) -> Self {
        Self {
            client,
            fetch_timeout: config.fetch_timeout,
            retry_interval: config.retry_interval,
        }
    }

    /// Fetch `height` from one of `peers`, retrying until a peer answers or
    /// `cancel` fires. `attempt` seeds peer rotation so a revalidation
    /// failure moves on to the next peer; the returned counter feeds the next
    /// call. Returns `None` only on cancellation.
    pub async fn fetch(
        &self,
        height: u64,
        peers: &[String],
        mut attempt: usize,
        cancel: &CancellationToken,
    ) -> Option<(GetBlockResponse, usize)> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if peers.is_empty() {
                warn!(height, "no peers to sync from");
                self.backoff(cancel).await?;
                continue;
            }

            let peer = &peers[attempt % peers.len()];
            attempt = attempt.wrapping_add(1);
            trace!(height, peer, "fetching block");

            match tokio::time::timeout(self.fetch_timeout, self.client.fetch_block(peer, height))
                .await
            {
                Ok(Ok(response)) => {
                    if response.block.height != height {
                        warn!(height, peer, got = response.block.height, "peer answered wrong height");
                    } else {
                        return Some((response, attempt));
                    }
                }
                Ok(Err(e)) => {
                    warn!(height, peer, error = %e, "fetch failure");
                }
                Err(_) => {
                    warn!(height, peer, "fetch timed out");
                }
            }
            self.backoff(cancel).await?;
        }
    }

    async fn backoff(&self, cancel: &CancellationToken) -> Option<()> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep(self.retry_interval) => Some(()),
        }
    }
}
