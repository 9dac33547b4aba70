//! Block synchronization.
//!
//! When the local chain falls behind the height peers report, the sync engine
//! catches up height-by-height:
//!
//! - [`Syncer`]: one event loop over the periodic check tick, target
//!   updates, progress queries, and block-persisted notifications
//! - [`WorkPool`]: bounded concurrency, non-blocking submission
//! - [`BlockFetcher`]: per-height fetch with peer rotation, timeout, and
//!   retry backoff
//! - [`BlockValidator`]: re-validates candidates against the local chain and
//!   persists them atomically
//! - [`BlockWaitBus`]: wakes the loop as soon as the next height lands,
//!   without waiting for the periodic tick
//!
//! The state machine side of consensus only hands over a target height; all
//! sync I/O lives here.

mod config;
mod fetcher;
mod pool;
mod syncer;
mod validator;
mod wait;

pub use config::SyncConfig;
pub use fetcher::{BlockFetchClient, BlockFetcher, FetchError};
pub use pool::WorkPool;
pub use syncer::{SyncHandle, SyncProgress, Syncer, SyncerStopped};
pub use validator::{BlockValidator, SyncValidationError};
pub use wait::BlockWaitBus;
