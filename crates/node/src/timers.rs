//! Timer management for the node runner.
//!
//! Each timer is a tokio task that sleeps and then reports its id back to the
//! runner's event loop, which turns it into the matching consensus event.
//! Setting an id again replaces the running timer.

use isaac_core::TimerId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

pub struct TimerManager {
    timers: HashMap<TimerId, JoinHandle<()>>,
    fired_tx: mpsc::Sender<TimerId>,
}

impl TimerManager {
    /// Returns the manager and the receiver the runner selects on.
    pub fn new() -> (Self, mpsc::Receiver<TimerId>) {
        let (fired_tx, fired_rx) = mpsc::channel(64);
        (
            Self {
                timers: HashMap::new(),
                fired_tx,
            },
            fired_rx,
        )
    }

    /// Schedule `id` to fire after `duration`, replacing any running timer
    /// with the same id.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);
        let fired_tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(?id, "timer fired");
            let _ = fired_tx.send(id).await;
        });
        self.timers.insert(id, handle);
        trace!(?id, ?duration, "timer set");
    }

    /// No-op if the timer does not exist or already fired.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            trace!(?id, "timer cancelled");
        }
    }

    /// Called during shutdown.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
