//! End-to-end tests for the sync engine against in-memory peers.

use async_trait::async_trait;
use isaac_messages::GetBlockResponse;
use isaac_storage::{get_block, latest_height, make_genesis, MemoryStore, Store};
use isaac_sync::{
    BlockFetchClient, BlockFetcher, BlockValidator, BlockWaitBus, FetchError, SyncConfig, Syncer,
};
use isaac_types::{Account, Block, KeyPair};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NETWORK_ID: &[u8] = b"test-network";

fn keypair(seed: u8) -> KeyPair {
    KeyPair::from_seed([seed; 32])
}

/// Build a chain of empty blocks; the first `local_height` land in `local`,
/// all of them in the returned "remote" store.
fn build_chains(local: &MemoryStore, local_height: u64, remote_height: u64) -> MemoryStore {
    let remote = MemoryStore::new();
    let proposer = keypair(99).address();
    let accounts = [Account::new(
        keypair(1).address(),
        isaac_types::Amount::new(1_000_000),
    )];

    let mut prev = make_genesis(&remote, &accounts, proposer.clone(), "t1".into()).unwrap();
    make_genesis(local, &accounts, proposer.clone(), "t1".into()).unwrap();

    for height in 2..=remote_height {
        let block = Block::new(
            height,
            prev.hash,
            proposer.clone(),
            vec![],
            None,
            prev.total_txs,
            format!("t{height}"),
        )
        .unwrap();
        isaac_storage::apply_block(&remote, &block, &[]).unwrap();
        if height <= local_height {
            isaac_storage::apply_block(local, &block, &[]).unwrap();
        }
        prev = block;
    }
    remote
}

/// Serves blocks straight out of a backing store, per peer name.
struct StoreBackedClient {
    peers: Vec<(String, Arc<MemoryStore>)>,
    /// Peers that answer with a corrupted block.
    corrupt: Vec<String>,
}

#[async_trait]
impl BlockFetchClient for StoreBackedClient {
    async fn fetch_block(&self, peer: &str, height: u64) -> Result<GetBlockResponse, FetchError> {
        let store = self
            .peers
            .iter()
            .find(|(name, _)| name == peer)
            .map(|(_, store)| store)
            .ok_or_else(|| FetchError::Unreachable(peer.to_string()))?;
        let mut block = get_block(store.as_ref(), height)
            .map_err(|e| FetchError::Invalid(e.to_string()))?
            .ok_or(FetchError::NotFound(height))?;
        if self.corrupt.iter().any(|c| c == peer) {
            block.total_txs += 1;
        }
        Ok(GetBlockResponse {
            block,
            transactions: vec![],
        })
    }
}

fn quick_config() -> SyncConfig {
    SyncConfig {
        pool_size: 300,
        fetch_timeout: Duration::from_millis(500),
        retry_interval: Duration::from_millis(5),
        // Long enough that only target updates and notifications drive the
        // test.
        check_interval: Duration::from_secs(120),
    }
}

fn spawn_syncer(
    local: Arc<MemoryStore>,
    client: Arc<dyn BlockFetchClient>,
    cancel: CancellationToken,
) -> (isaac_sync::SyncHandle, tokio::task::JoinHandle<()>) {
    let config = quick_config();
    let store: Arc<dyn Store> = local;
    let fetcher = BlockFetcher::new(client, &config);
    let validator = Arc::new(BlockValidator::new(
        Arc::clone(&store),
        NETWORK_ID.to_vec(),
        1_000,
        241_920,
    ));
    let wait_bus = Arc::new(BlockWaitBus::new());
    let (syncer, handle) = Syncer::new(config, store, fetcher, validator, wait_bus, cancel);
    let task = tokio::spawn(syncer.run());
    (handle, task)
}

async fn wait_for_height(store: &MemoryStore, height: u64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if latest_height(store).unwrap() >= height {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sync should reach the target height");
}

#[tokio::test]
async fn catches_up_to_target() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(build_chains(&local, 10, 25));
    assert_eq!(latest_height(local.as_ref()).unwrap(), 10);

    let client = Arc::new(StoreBackedClient {
        peers: vec![("peer-a".into(), remote.clone())],
        corrupt: vec![],
    });
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_syncer(local.clone(), client, cancel.clone());

    handle
        .set_sync_target(25, vec!["peer-a".into()])
        .await
        .unwrap();
    wait_for_height(&local, 25).await;

    let progress = handle.sync_progress().await.unwrap();
    assert_eq!(progress.starting, 11);
    assert_eq!(progress.current, 25);
    assert_eq!(progress.highest, 25);

    // The stored bytes match the peer's byte-for-byte.
    for height in 11..=25 {
        let ours = isaac_storage::get_block_bytes(local.as_ref(), height).unwrap();
        let theirs = isaac_storage::get_block_bytes(remote.as_ref(), height).unwrap();
        assert_eq!(ours, theirs, "height {height}");
    }

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn corrupt_peer_is_retried_elsewhere() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(build_chains(&local, 3, 6));

    let client = Arc::new(StoreBackedClient {
        peers: vec![
            ("evil".into(), remote.clone()),
            ("honest".into(), remote.clone()),
        ],
        corrupt: vec!["evil".into()],
    });
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_syncer(local.clone(), client, cancel.clone());

    handle
        .set_sync_target(6, vec!["evil".into(), "honest".into()])
        .await
        .unwrap();
    wait_for_height(&local, 6).await;

    assert_eq!(latest_height(local.as_ref()).unwrap(), 6);
    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn repeated_target_updates_pipeline() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(build_chains(&local, 1, 8));

    let client = Arc::new(StoreBackedClient {
        peers: vec![("peer-a".into(), remote.clone())],
        corrupt: vec![],
    });
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_syncer(local.clone(), client, cancel.clone());

    handle
        .set_sync_target(4, vec!["peer-a".into()])
        .await
        .unwrap();
    wait_for_height(&local, 4).await;

    handle
        .set_sync_target(8, vec!["peer-a".into()])
        .await
        .unwrap();
    wait_for_height(&local, 8).await;

    let progress = handle.sync_progress().await.unwrap();
    assert_eq!(progress.current, 8);
    assert_eq!(progress.highest, 8);

    cancel.cancel();
    task.await.unwrap();
}
