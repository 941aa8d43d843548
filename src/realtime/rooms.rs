use std::{collections::HashSet, hash::{BuildHasher, RandomState}, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::{db::MessageRecord, error::ChatError};

use super::{
    display_name, tracked, ConnId, ConnectionRegistry, Connections, MessageLog, PresencePublisher,
    ServerEvent, HISTORY_LIMIT,
};

const ORDER_STRIPES: usize = 64;

/// Deterministic room shared by two users, whoever opens it first.
pub fn pm_room_for(u1: i64, u2: i64) -> String {
    format!("pm:{}:{}", u1.min(u2), u1.max(u2))
}

/// Room membership and everything delivered through it.
///
/// Membership lives only in memory and only for live connections. Anything
/// that touches a room's membership or its log runs under that room's
/// ordering lock, so every member sees messages in the order the log
/// assigned them and a history replay never overlaps a live delivery.
pub struct RoomBroadcaster<L> {
    log: L,
    connections: Arc<Connections>,
    registry: Arc<ConnectionRegistry>,
    presence: PresencePublisher,
    members: DashMap<String, HashSet<ConnId>>,
    joined: DashMap<ConnId, HashSet<String>>,
    order: Box<[Mutex<()>]>,
    hasher: RandomState,
}

impl<L: MessageLog> RoomBroadcaster<L> {
    pub fn new(log: L) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let connections = Arc::new(Connections::new());
        let presence = PresencePublisher::new(registry.clone(), connections.clone());

        Self {
            log,
            connections,
            registry,
            presence,
            members: DashMap::new(),
            joined: DashMap::new(),
            order: (0..ORDER_STRIPES).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn presence(&self) -> &PresencePublisher {
        &self.presence
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Opens a socket's outbound queue.
    pub fn connect(&self) -> (ConnId, mpsc::Receiver<ServerEvent>) {
        self.connections.open()
    }

    /// Queues an event for one socket only.
    pub fn send_to(&self, conn: ConnId, event: ServerEvent) -> bool {
        self.connections.send(conn, event)
    }

    pub async fn join(&self, conn: ConnId, identity: &str, room: &str) -> Result<(), ChatError> {
        let name = display_name(identity);
        {
            let _order = self.order_for(room).lock().await;

            let newly_joined = self.add_member(conn, room);
            let history = match self.log.recent(room, HISTORY_LIMIT).await {
                Ok(history) => history,
                Err(err) => {
                    if newly_joined {
                        self.remove_member(conn, room);
                    }
                    return Err(err);
                }
            };

            self.connections.send(conn, ServerEvent::History { messages: history });
            if newly_joined {
                self.fan_out(room, ServerEvent::status(format!("{name} has entered the room.")));
            }
        }

        debug!(%conn, identity = name, room, "joined");
        if let Some(identity) = tracked(identity) {
            if self.registry.register(identity, conn) {
                self.presence.publish();
            }
        }
        Ok(())
    }

    pub async fn leave(&self, conn: ConnId, identity: &str, room: &str) {
        let name = display_name(identity);
        {
            let _order = self.order_for(room).lock().await;
            if self.remove_member(conn, room) {
                self.fan_out(room, ServerEvent::status(format!("{name} has left the room.")));
            }
        }

        debug!(%conn, identity = name, room, "left");
        if let Some(identity) = tracked(identity) {
            if self.registry.unregister(identity, conn) {
                self.presence.publish();
            }
        }
    }

    /// Persists the message, then delivers it to everyone in the room.
    /// Nothing is delivered if persistence fails.
    pub async fn broadcast_message(
        &self,
        room: &str,
        identity: &str,
        text: &str,
    ) -> Result<MessageRecord, ChatError> {
        let _order = self.order_for(room).lock().await;

        let record = self.log.append(room, display_name(identity), text).await?;
        let delivered = self.fan_out(room, ServerEvent::from(&record));
        debug!(id = record.id, room, delivered, "message broadcast");

        Ok(record)
    }

    /// Forgets a dead socket everywhere and publishes presence once.
    pub fn disconnect_all(&self, conn: ConnId) {
        self.connections.close(conn);

        let rooms = self
            .joined
            .remove(&conn)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default();
        for room in &rooms {
            if let Entry::Occupied(mut entry) = self.members.entry(room.clone()) {
                entry.get_mut().remove(&conn);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }

        self.registry.unregister_connection(conn);
        let notified = self.presence.publish();
        debug!(%conn, rooms = rooms.len(), notified, "connection cleaned up");
    }

    pub fn members_of(&self, room: &str) -> HashSet<ConnId> {
        self.members
            .get(room)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, conn: ConnId) -> HashSet<String> {
        self.joined
            .get(&conn)
            .map(|rooms| rooms.clone())
            .unwrap_or_default()
    }

    fn order_for(&self, room: &str) -> &Mutex<()> {
        let stripe = self.hasher.hash_one(room) as usize % self.order.len();
        &self.order[stripe]
    }

    fn add_member(&self, conn: ConnId, room: &str) -> bool {
        let added = self.members.entry(room.to_owned()).or_default().insert(conn);
        self.joined.entry(conn).or_default().insert(room.to_owned());
        added
    }

    fn remove_member(&self, conn: ConnId, room: &str) -> bool {
        let removed = match self.members.entry(room.to_owned()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&conn);
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        };

        if let Entry::Occupied(mut entry) = self.joined.entry(conn) {
            entry.get_mut().remove(room);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
        removed
    }

    fn fan_out(&self, room: &str, event: ServerEvent) -> usize {
        let targets = self.members_of(room);
        let mut delivered = 0;
        for conn in targets {
            if self.connections.send(conn, event.clone()) {
                delivered += 1;
            } else {
                warn!(%conn, room, "dropping event for closed connection");
            }
        }
        delivered
    }
}
