//! Node metrics using the native Prometheus client.
//!
//! Domain-specific counters rather than generic event counters; traces carry
//! the event-level detail.

use prometheus::{register_counter, register_gauge, Counter, Gauge};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub struct Metrics {
    // === Consensus ===
    pub blocks_committed: Counter,
    pub block_height: Gauge,
    pub ballots_processed: Counter,

    // === Transactions ===
    pub transactions_admitted: Counter,
    pub transactions_rejected: Counter,
    pub pool_size: Gauge,
}

impl Metrics {
    fn new() -> Self {
        Self {
            blocks_committed: register_counter!(
                "isaac_blocks_committed_total",
                "Blocks committed by consensus"
            )
            .expect("metric registration"),
            block_height: register_gauge!(
                "isaac_block_height",
                "Latest committed block height"
            )
            .expect("metric registration"),
            ballots_processed: register_counter!(
                "isaac_ballots_processed_total",
                "Ballots accepted into the voting box"
            )
            .expect("metric registration"),
            transactions_admitted: register_counter!(
                "isaac_transactions_admitted_total",
                "Transactions admitted to the pool"
            )
            .expect("metric registration"),
            transactions_rejected: register_counter!(
                "isaac_transactions_rejected_total",
                "Transactions rejected at ingress"
            )
            .expect("metric registration"),
            pool_size: register_gauge!("isaac_pool_size", "Transactions staged in the pool")
                .expect("metric registration"),
        }
    }
}

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

pub fn record_block_committed(height: u64, pool_size: usize) {
    let m = metrics();
    m.blocks_committed.inc();
    m.block_height.set(height as f64);
    m.pool_size.set(pool_size as f64);
}

pub fn record_transaction_admitted(pool_size: usize) {
    let m = metrics();
    m.transactions_admitted.inc();
    m.pool_size.set(pool_size as f64);
}

pub fn record_transaction_rejected() {
    metrics().transactions_rejected.inc();
}

pub fn record_ballot_processed() {
    metrics().ballots_processed.inc();
}
