use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;
use uuid::Uuid;

use super::{ConnId, ServerEvent};

/// Events a socket may have queued before it counts as stalled.
pub const OUTBOX_CAPACITY: usize = 256;

/// Outbound queues of every live socket.
///
/// Sends never wait on the client: each socket drains its own bounded queue
/// on a dedicated writer task. A socket whose queue fills up is closed, which
/// ends its writer and so the whole connection.
#[derive(Debug, Default)]
pub struct Connections {
    outboxes: DashMap<ConnId, mpsc::Sender<ServerEvent>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) -> (ConnId, mpsc::Receiver<ServerEvent>) {
        let conn = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.outboxes.insert(conn, tx);
        (conn, rx)
    }

    /// Drops the queue, which ends the socket's writer task.
    pub fn close(&self, conn: ConnId) -> bool {
        self.outboxes.remove(&conn).is_some()
    }

    /// Best-effort delivery. Returns false if the socket is gone or stalled.
    pub fn send(&self, conn: ConnId, event: ServerEvent) -> bool {
        let result = match self.outboxes.get(&conn) {
            Some(tx) => tx.try_send(event),
            None => return false,
        };
        self.settle(conn, result)
    }

    /// Delivers to every live socket, returning how many accepted the event.
    pub fn send_all(&self, event: &ServerEvent) -> usize {
        let results: Vec<_> = self
            .outboxes
            .iter()
            .map(|tx| (*tx.key(), tx.try_send(event.clone())))
            .collect();

        results
            .into_iter()
            .map(|(conn, result)| self.settle(conn, result))
            .filter(|accepted| *accepted)
            .count()
    }

    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    // must not be called while a map guard is held
    fn settle(&self, conn: ConnId, result: Result<(), TrySendError<ServerEvent>>) -> bool {
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%conn, capacity = OUTBOX_CAPACITY, "outbox full, closing stalled connection");
                self.close(conn);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
