//! The in-memory transaction pool.

use isaac_types::{Address, Hash, Transaction};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Staging area for admitted transactions, shared between the admission
/// pipeline and the consensus loop.
///
/// Three views are kept consistent under one lock: the hash → transaction
/// map, the set of source addresses with a pending transaction, and the
/// insertion-ordered hash sequence the proposer drains from. At most one
/// transaction per source is pooled at any time; the admission pipeline
/// rejects a second one before it gets here.
///
/// Readers take shared access; `add` and `remove` take the write lock, and
/// `remove` deletes its whole argument list under a single acquisition.
#[derive(Debug, Default)]
pub struct TransactionPool {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pool: HashMap<Hash, Transaction>,
    sources: HashSet<Address>,
    /// Insertion order of `pool` keys; mirrors the key set exactly.
    hashes: Vec<Hash>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().pool.is_empty()
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.inner.read().pool.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.inner.read().pool.get(hash).cloned()
    }

    /// Whether some pooled transaction already spends from `source`.
    pub fn is_same_source(&self, source: &Address) -> bool {
        self.inner.read().sources.contains(source)
    }

    /// Insert a transaction. Returns false (and changes nothing) if the hash
    /// is already pooled.
    pub fn add(&self, tx: Transaction) -> bool {
        let mut inner = self.inner.write();
        if inner.pool.contains_key(&tx.hash()) {
            return false;
        }
        let hash = tx.hash();
        inner.sources.insert(tx.source().clone());
        inner.hashes.push(hash);
        inner.pool.insert(hash, tx);
        true
    }

    /// Delete every listed hash atomically, pruning the source set and the
    /// ordered sequence along with the map. Unknown hashes are skipped.
    pub fn remove(&self, hashes: &[Hash]) {
        if hashes.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        for hash in hashes {
            if let Some(tx) = inner.pool.remove(hash) {
                inner.sources.remove(tx.source());
                if let Some(pos) = inner.hashes.iter().position(|h| h == hash) {
                    inner.hashes.remove(pos);
                }
            }
        }
    }

    /// Up to `limit` pooled hashes in insertion order; what the proposer
    /// packs into a proposal.
    pub fn available_transactions(&self, limit: usize) -> Vec<Hash> {
        if limit == 0 {
            return Vec::new();
        }
        self.inner.read().hashes.iter().take(limit).copied().collect()
    }
}
