//! The connection manager.
//!
//! The core consumes peer connectivity as an interface: broadcast to every
//! known validator, unicast to one, and the endpoint list the sync engine
//! fetches from. The production transport (JSON over HTTP) lives outside the
//! core; [`ChannelHub`] wires nodes together in-process for tests.

use async_trait::async_trait;
use isaac_messages::NetworkMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Abstract broadcast and unicast to the known validators.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// Send to every known validator except this node.
    async fn broadcast(&self, message: NetworkMessage);

    /// Send to a single endpoint.
    async fn unicast(&self, endpoint: &str, message: NetworkMessage);

    /// Endpoints of every known validator except this node.
    fn known_endpoints(&self) -> Vec<String>;
}

/// In-process message fabric: every registered endpoint gets a raw-bytes
/// inbox, and [`ChannelConnection`]s deliver encoded messages into them.
#[derive(Default)]
pub struct ChannelHub {
    inboxes: Mutex<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl ChannelHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an endpoint and take its inbox.
    pub fn register(&self, endpoint: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().insert(endpoint.to_string(), tx);
        rx
    }

    /// A sender into an endpoint's inbox, for injecting client submissions.
    pub fn sender(&self, endpoint: &str) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.inboxes.lock().get(endpoint).cloned()
    }

    fn deliver(&self, endpoint: &str, bytes: Vec<u8>) {
        let sender = self.inboxes.lock().get(endpoint).cloned();
        match sender {
            Some(tx) => {
                // A closed inbox is a stopped node.
                let _ = tx.send(bytes);
            }
            None => warn!(endpoint, "no such endpoint"),
        }
    }
}

/// One node's view of the [`ChannelHub`].
pub struct ChannelConnection {
    hub: Arc<ChannelHub>,
    local: String,
}

impl ChannelConnection {
    pub fn new(hub: Arc<ChannelHub>, local: impl Into<String>) -> Self {
        Self {
            hub,
            local: local.into(),
        }
    }
}

#[async_trait]
impl ConnectionManager for ChannelConnection {
    async fn broadcast(&self, message: NetworkMessage) {
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode broadcast");
                return;
            }
        };
        let endpoints: Vec<String> = self
            .hub
            .inboxes
            .lock()
            .keys()
            .filter(|endpoint| **endpoint != self.local)
            .cloned()
            .collect();
        trace!(kind = message.kind(), peers = endpoints.len(), "broadcast");
        for endpoint in endpoints {
            self.hub.deliver(&endpoint, bytes.clone());
        }
    }

    async fn unicast(&self, endpoint: &str, message: NetworkMessage) {
        match message.encode() {
            Ok(bytes) => self.hub.deliver(endpoint, bytes),
            Err(e) => warn!(error = %e, "failed to encode unicast"),
        }
    }

    fn known_endpoints(&self) -> Vec<String> {
        self.hub
            .inboxes
            .lock()
            .keys()
            .filter(|endpoint| **endpoint != self.local)
            .cloned()
            .collect()
    }
}
