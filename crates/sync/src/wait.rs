//! Block-persisted notifications.

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Wakes waiters when the chain reaches a height.
///
/// Owned by the node and shared with the sync engine: block persistence (by
/// consensus commit or by a sync worker) calls [`notify`](Self::notify), and
/// the sync loop parks on [`wait_for`](Self::wait_for) to pipeline the next
/// height without waiting for its periodic tick.
#[derive(Debug, Default)]
pub struct BlockWaitBus {
    waiters: Mutex<Vec<(u64, oneshot::Sender<u64>)>>,
}

impl BlockWaitBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A future that resolves once some block at `height` or above persists.
    pub fn wait_for(&self, height: u64) -> oneshot::Receiver<u64> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push((height, tx));
        rx
    }

    /// Announce that the block at `height` has been persisted.
    pub fn notify(&self, height: u64) {
        let mut waiters = self.waiters.lock();
        let mut remaining = Vec::with_capacity(waiters.len());
        for (wanted, tx) in waiters.drain(..) {
            if wanted <= height {
                // A dropped receiver just means the waiter lost interest.
                let _ = tx.send(height);
            } else {
                remaining.push((wanted, tx));
            }
        }
        *waiters = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wakes_waiters_at_or_below() {
        let bus = BlockWaitBus::new();
        let low = bus.wait_for(3);
        let high = bus.wait_for(10);

        bus.notify(5);
        assert_eq!(low.await.unwrap(), 5);

        bus.notify(10);
        assert_eq!(high.await.unwrap(), 10);
    }

    #[tokio::test]
    async fn dropped_waiter_is_harmless() {
        let bus = BlockWaitBus::new();
        drop(bus.wait_for(1));
        bus.notify(1);
    }
}
