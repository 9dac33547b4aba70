//! Bounded worker pool.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs jobs concurrently with a hard upper bound on how many are in flight.
///
/// Submission is non-blocking: when the pool is full, `try_add` returns false
/// and the caller resumes on its next tick. `finish` drains everything still
/// running; jobs are expected to observe their own cancellation token.
pub struct WorkPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkPool {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
        }
    }

    /// Spawn `job` if a slot is free. Returns false when the pool is full.
    pub fn try_add<F>(&mut self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                self.tasks.spawn(async move {
                    job.await;
                    drop(permit);
                });
                true
            }
            Err(_) => false,
        }
    }

    /// Discard handles of jobs that already finished.
    pub fn reap(&mut self) {
        while self.tasks.try_join_next().is_some() {}
    }

    /// Wait for every in-flight job to return.
    pub async fn finish(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}
