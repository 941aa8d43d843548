use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tower_sessions::Session;
use tracing::{debug, info, warn};

use crate::{session::USERNAME, AppResult};

use super::{Chat, ConnId, Intent, MessageLog, RoomBroadcaster, ServerEvent, ANONYMOUS};

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    State(chat): State<Arc<Chat>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let identity = session.get::<String>(USERNAME).await?;

    Ok(ws.on_upgrade(move |socket| serve(chat, identity, socket)))
}

/// Runs one socket until either direction fails, then cleans it up.
pub async fn serve(chat: Arc<Chat>, identity: Option<String>, socket: WebSocket) {
    let (conn, mut outbox) = chat.connect();
    info!(%conn, identity = identity.as_deref().unwrap_or(ANONYMOUS), "client connected");

    let (mut sender, mut receiver) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%err, "unserializable event");
                    continue;
                }
            };
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let reader = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(frame) => dispatch(&*chat, conn, identity.as_deref(), frame.as_str()).await,
                Message::Close(_) => break,
                _ => continue,
            }
        }
    };

    tokio::select! {
        _ = &mut writer => {},
        _ = reader => writer.abort(),
    };

    chat.disconnect_all(conn);
    info!(%conn, "client disconnected");
}

/// Decodes and runs one client frame. Failures only ever reach `conn`.
pub async fn dispatch<L: MessageLog>(
    chat: &RoomBroadcaster<L>,
    conn: ConnId,
    identity: Option<&str>,
    frame: &str,
) {
    let intent = match Intent::decode(frame) {
        Ok(intent) => intent,
        Err(err) => {
            warn!(%conn, %err, "rejected intent");
            chat.send_to(conn, ServerEvent::error(err.to_string()));
            return;
        }
    };
    let intent = match identity {
        Some(identity) => intent.with_identity(identity),
        None => intent,
    };
    debug!(%conn, ?intent, "intent");

    let result = match intent {
        Intent::Join { username, room } => chat.join(conn, &username, &room).await,
        Intent::Message { username, room, text } => {
            chat.broadcast_message(&room, &username, &text).await.map(|_| ())
        }
        Intent::Leave { username, room } => {
            chat.leave(conn, &username, &room).await;
            Ok(())
        }
    };

    if let Err(err) = result {
        warn!(%conn, %err, "intent failed");
        chat.send_to(conn, ServerEvent::error(err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::{db, realtime::SqliteMessageLog};

    async fn chat() -> RoomBroadcaster<SqliteMessageLog> {
        RoomBroadcaster::new(SqliteMessageLog::new(db::in_memory().await.unwrap()))
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn malformed_frame_only_answers_the_sender() {
        let chat = chat().await;
        let (a, mut rx_a) = chat.connect();
        let (b, mut rx_b) = chat.connect();
        dispatch(&chat, b, None, r#"{"type":"join","username":"bob","room":"main"}"#).await;
        drain(&mut rx_b);

        dispatch(&chat, a, None, r#"{"type":"message","username":"alice","room":"main"}"#).await;
        dispatch(&chat, a, None, "{").await;

        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, ServerEvent::Error { .. })));
        assert!(drain(&mut rx_b).is_empty());
        assert!(chat.log().recent("main", 100).await.unwrap().is_empty());
        assert!(chat.rooms_of(a).is_empty());
    }

    #[tokio::test]
    async fn session_identity_wins_over_claimed_username() {
        let chat = chat().await;
        let (a, mut rx_a) = chat.connect();

        dispatch(&chat, a, Some("alice"), r#"{"type":"join","username":"mallory","room":"main"}"#).await;
        dispatch(&chat, a, Some("alice"), r#"{"type":"message","username":"mallory","room":"main","msg":"hi"}"#).await;

        assert!(chat.registry().is_online("alice"));
        assert!(!chat.registry().is_online("mallory"));
        let history = chat.log().recent("main", 100).await.unwrap();
        assert_eq!(history[0].username, "alice");
        assert!(drain(&mut rx_a).contains(&ServerEvent::status("alice has entered the room.")));
    }

    #[tokio::test]
    async fn full_intent_cycle() {
        let chat = chat().await;
        let (a, mut rx_a) = chat.connect();

        dispatch(&chat, a, None, r#"{"type":"join","username":"alice","room":"main"}"#).await;
        dispatch(&chat, a, None, r#"{"type":"message","username":"alice","room":"main","msg":"hello"}"#).await;
        dispatch(&chat, a, None, r#"{"type":"leave","username":"alice","room":"main"}"#).await;

        let events = drain(&mut rx_a);
        assert!(matches!(&events[0], ServerEvent::History { messages } if messages.is_empty()));
        assert!(events.iter().any(|e| matches!(e, ServerEvent::Message { msg, .. } if msg == "hello")));
        assert_eq!(events.last(), Some(&ServerEvent::Presence { online: vec![] }));
        assert!(chat.members_of("main").is_empty());
    }
}
