//! The catch-up event loop.

use crate::{BlockFetcher, BlockValidator, BlockWaitBus, SyncConfig, WorkPool};
use isaac_storage::{latest_height, Store};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the catch-up stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    /// First height this catch-up had to fetch.
    pub starting: u64,
    /// Highest height handed to the worker pool so far.
    pub current: u64,
    /// Target ceiling reported by peers.
    pub highest: u64,
}

enum SyncRequest {
    SetTarget { height: u64, peers: Vec<String> },
    Progress(oneshot::Sender<SyncProgress>),
}

/// Error talking to a syncer that has shut down.
#[derive(Debug, thiserror::Error)]
#[error("syncer is not running")]
pub struct SyncerStopped;

/// Cheap cloneable handle into the running [`Syncer`].
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncRequest>,
}

impl SyncHandle {
    /// Signal a new known network ceiling and the peers that reported it.
    pub async fn set_sync_target(
        &self,
        height: u64,
        peers: Vec<String>,
    ) -> Result<(), SyncerStopped> {
        self.tx
            .send(SyncRequest::SetTarget { height, peers })
            .await
            .map_err(|_| SyncerStopped)
    }

    pub async fn sync_progress(&self) -> Result<SyncProgress, SyncerStopped> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(SyncRequest::Progress(tx))
            .await
            .map_err(|_| SyncerStopped)?;
        rx.await.map_err(|_| SyncerStopped)
    }
}

/// Catch-up engine: when the local chain lags a peer-reported height, fetch
/// and validate the missing blocks height-by-height with a bounded worker
/// pool.
///
/// One event loop services a periodic check tick, target updates, progress
/// queries, and block-persisted notifications, with a single-flight guard on
/// the notification subscription.
pub struct Syncer {
    config: SyncConfig,
    store: Arc<dyn Store>,
    fetcher: BlockFetcher,
    validator: Arc<BlockValidator>,
    wait_bus: Arc<BlockWaitBus>,
    cancel: CancellationToken,
    request_rx: mpsc::Receiver<SyncRequest>,
    peers: Vec<String>,
}

impl Syncer {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn Store>,
        fetcher: BlockFetcher,
        validator: Arc<BlockValidator>,
        wait_bus: Arc<BlockWaitBus>,
        cancel: CancellationToken,
    ) -> (Self, SyncHandle) {
        let (tx, request_rx) = mpsc::channel(16);
        (
            Self {
                config,
                store,
                fetcher,
                validator,
                wait_bus,
                cancel,
                request_rx,
                peers: Vec::new(),
            },
            SyncHandle { tx },
        )
    }

    /// Run until cancelled. Drains the worker pool before returning.
    pub async fn run(mut self) {
        info!("starting syncer");
        let mut pool = WorkPool::new(self.config.pool_size);

        let local = latest_height(self.store.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "could not read local height, assuming empty chain");
            0
        });
        let mut progress = SyncProgress {
            starting: local,
            current: local,
            highest: local,
        };

        let mut check = tokio::time::interval(self.config.check_interval);
        check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Single-flight: at most one pending block-wait subscription.
        let mut notify: Option<oneshot::Receiver<u64>> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = check.tick() => {
                    debug!(interval = ?self.config.check_interval, "periodic sync check");
                    self.sync(&mut progress, &mut pool);
                }
                notified = async { notify.as_mut().expect("guarded by is_some").await },
                    if notify.is_some() =>
                {
                    notify = None;
                    if notified.is_ok() {
                        debug!("woken by block notification");
                        self.sync(&mut progress, &mut pool);
                    }
                }
                request = self.request_rx.recv() => match request {
                    Some(SyncRequest::SetTarget { height, peers }) => {
                        info!(height, peers = peers.len(), "sync target updated");
                        self.peers = peers;
                        if height > progress.current {
                            progress.highest = height;
                            self.sync(&mut progress, &mut pool);
                        }
                    }
                    Some(SyncRequest::Progress(reply)) => {
                        let _ = reply.send(progress);
                    }
                    None => break,
                },
            }

            pool.reap();
            if notify.is_none() && progress.current < progress.highest {
                notify = Some(self.wait_bus.wait_for(progress.current + 1));
            }
        }

        pool.finish().await;
        info!("stopped syncer");
    }

    /// Submit work for every missing height up to the target. Stops early
    /// when the pool is full; the next tick resumes where this one left off.
    fn sync(&self, progress: &mut SyncProgress, pool: &mut WorkPool) {
        let local = latest_height(self.store.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "could not read local height");
            0
        });

        let mut start = progress.current + 1;
        if local > progress.current {
            start = local + 1;
        }
        if start > progress.highest {
            progress.starting = local + 1;
            progress.current = progress.current.max(local);
            debug!(
                start = progress.starting,
                current = progress.current,
                highest = progress.highest,
                "nothing to sync"
            );
            return;
        }

        let mut current = progress.current.max(local);
        for height in start..=progress.highest {
            if !self.submit(height, pool) {
                debug!(height, "worker pool full, resuming next tick");
                break;
            }
            current = height;
        }
        progress.starting = start;
        progress.current = current;

        info!(
            start = progress.starting,
            current = progress.current,
            highest = progress.highest,
            "sync progress"
        );
    }

    /// One worker: fetch-then-validate for a single height, retrying until
    /// the block lands or the engine shuts down.
    fn submit(&self, height: u64, pool: &mut WorkPool) -> bool {
        let store = Arc::clone(&self.store);
        let fetcher = self.fetcher.clone();
        let validator = Arc::clone(&self.validator);
        let wait_bus = Arc::clone(&self.wait_bus);
        let cancel = self.cancel.clone();
        let peers = self.peers.clone();
        let retry = self.config.retry_interval;

        pool.try_add(async move {
            if latest_height(store.as_ref()).unwrap_or(0) >= height {
                debug!(height, "height already synced");
                return;
            }
            // Spread the first peer pick across heights.
            let mut attempt = height as usize;
            loop {
                let Some((response, used)) = fetcher.fetch(height, &peers, attempt, &cancel).await
                else {
                    return;
                };
                attempt = used;
                match validator.validate_and_store(&response) {
                    Ok(()) => {
                        wait_bus.notify(height);
                        info!(height, hash = %response.block.hash, "done sync work");
                        return;
                    }
                    Err(e) => {
                        warn!(height, error = %e, "validate failure");
                        // The peer may be malicious or behind; take the next
                        // one after a breather.
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(retry) => {}
                        }
                    }
                }
            }
        })
    }
}
