//! In-memory staging of admitted transactions.
//!
//! The pool indexes by hash, by source, and by insertion order, and keeps all
//! three consistent under one read/write lock. See [`TransactionPool`].

mod pool;

pub use pool::TransactionPool;
