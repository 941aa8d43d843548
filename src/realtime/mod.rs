//! The realtime core: who is connected, which rooms they are in, and
//! delivery of messages, status notices and presence to the right sockets.

mod connections;
mod message_log;
mod presence;
mod protocol;
mod registry;
mod rooms;
mod ws;

use axum::{routing::get, Router};
use uuid::Uuid;

use crate::AppState;

pub use connections::Connections;
pub use message_log::{MessageLog, SqliteMessageLog};
pub use presence::PresencePublisher;
pub use protocol::{Intent, ServerEvent};
pub use registry::ConnectionRegistry;
pub use rooms::{pm_room_for, RoomBroadcaster};
pub use ws::{dispatch, serve};

/// Server-assigned handle for one live socket.
pub type ConnId = Uuid;

/// The broadcaster wired to the SQLite message log.
pub type Chat = RoomBroadcaster<SqliteMessageLog>;

pub const ANONYMOUS: &str = "Anonymous";

/// Number of messages replayed to a connection when it joins a room.
pub const HISTORY_LIMIT: u32 = 100;

/// The identity to track for presence, or `None` for anonymous users.
pub fn tracked(identity: &str) -> Option<&str> {
    let identity = identity.trim();
    (!identity.is_empty() && identity != ANONYMOUS).then_some(identity)
}

pub fn display_name(identity: &str) -> &str {
    tracked(identity).unwrap_or(ANONYMOUS)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_anonymous_identities_are_untracked() {
        assert_eq!(tracked(""), None);
        assert_eq!(tracked("   "), None);
        assert_eq!(tracked(ANONYMOUS), None);
        assert_eq!(tracked("alice"), Some("alice"));
        assert_eq!(display_name(""), ANONYMOUS);
        assert_eq!(display_name(" bob "), "bob");
    }
}
