//! The ordered key-value store behind the ledger.
//!
//! All operations are synchronous blocking I/O. Callers in async contexts
//! should use `spawn_blocking` if needed to avoid blocking the runtime.

use parking_lot::RwLock;
use rocksdb::{Options, WriteBatch, DB};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Iteration direction for prefix scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// A set of writes applied atomically.
#[derive(Debug, Default)]
pub struct Batch {
    pub(crate) ops: Vec<BatchOp>,
}

#[derive(Debug)]
pub(crate) enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key.into(), value));
    }

    pub fn put_json<T: Serialize>(
        &mut self,
        key: impl Into<Vec<u8>>,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, bytes);
        Ok(())
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// An ordered key-value store with prefix iteration.
///
/// The ledger treats the engine as opaque: string-prefixed keys, JSON values,
/// ordered scans, and atomic batches are the whole contract.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// All entries whose key starts with `prefix`, in key order
    /// (or reversed).
    fn iter_prefix(
        &self,
        prefix: &[u8],
        direction: Direction,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Apply a batch atomically.
    fn write(&self, batch: Batch) -> Result<(), StorageError>;
}

/// The smallest key strictly greater than every key starting with `prefix`.
pub(crate) fn next_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}

/// In-memory store for tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.map.write().remove(key);
        Ok(())
    }

    fn iter_prefix(
        &self,
        prefix: &[u8],
        direction: Direction,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let map = self.map.read();
        let mut items: Vec<_> = match next_prefix(prefix) {
            Some(end) => map
                .range(prefix.to_vec()..end)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => map
                .range(prefix.to_vec()..)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        if direction == Direction::Reverse {
            items.reverse();
        }
        Ok(items)
    }

    fn write(&self, batch: Batch) -> Result<(), StorageError> {
        let mut map = self.map.write();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => {
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }
}

/// RocksDB-backed store for production use.
pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_keep_log_file_num(4);
        let db = DB::open(&opts, path).map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(Self { db })
    }
}

impl Store for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db
            .delete(key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn iter_prefix(
        &self,
        prefix: &[u8],
        direction: Direction,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut items: Vec<(Vec<u8>, Vec<u8>)> = self
            .db
            .iterator(rocksdb::IteratorMode::From(
                prefix,
                rocksdb::Direction::Forward,
            ))
            .take_while(|item| match item {
                Ok((key, _)) => key.starts_with(prefix),
                Err(_) => false,
            })
            .filter_map(|item| item.ok().map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect();
        if direction == Direction::Reverse {
            items.reverse();
        }
        Ok(items)
    }

    fn write(&self, batch: Batch) -> Result<(), StorageError> {
        let mut wb = WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => wb.put(k, v),
                BatchOp::Delete(k) => wb.delete(k),
            }
        }
        self.db
            .write(wb)
            .map_err(|e| StorageError::Database(e.to_string()))
    }
}
