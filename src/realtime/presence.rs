use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{ConnectionRegistry, Connections, ServerEvent};

/// Pushes the global online list to every live socket.
///
/// Publishes are serialized: the snapshot and its delivery happen under one
/// lock, so the last update every socket receives is never older than the
/// last registry change that triggered a publish.
#[derive(Debug, Clone)]
pub struct PresencePublisher {
    registry: Arc<ConnectionRegistry>,
    connections: Arc<Connections>,
    publishing: Arc<Mutex<()>>,
}

impl PresencePublisher {
    pub fn new(registry: Arc<ConnectionRegistry>, connections: Arc<Connections>) -> Self {
        Self { registry, connections, publishing: Arc::default() }
    }

    pub fn snapshot(&self) -> ServerEvent {
        ServerEvent::Presence {
            online: self.registry.online_identities().into_iter().collect(),
        }
    }

    /// Returns the number of sockets the update was queued on.
    pub fn publish(&self) -> usize {
        let _publishing = self.publishing.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let event = self.snapshot();
        let delivered = self.connections.send_all(&event);
        debug!(?event, delivered, "presence published");
        delivered
    }
}
