use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{db::MessageRecord, error::ChatError};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Join {
        #[serde(default, alias = "identity")]
        username: Option<String>,
        #[serde(default)]
        room: Option<String>,
    },
    Message {
        #[serde(default, alias = "identity")]
        username: Option<String>,
        #[serde(default)]
        room: Option<String>,
        #[serde(default, alias = "text")]
        msg: Option<String>,
    },
    Leave {
        #[serde(default, alias = "identity")]
        username: Option<String>,
        #[serde(default)]
        room: Option<String>,
    },
}

/// A validated client request. `username` may be blank (anonymous).
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Join { username: String, room: String },
    Message { username: String, room: String, text: String },
    Leave { username: String, room: String },
}

impl Intent {
    pub fn decode(frame: &str) -> Result<Intent, ChatError> {
        let frame: ClientFrame = serde_json::from_str(frame)
            .map_err(|err| ChatError::Malformed(err.to_string()))?;

        Ok(match frame {
            ClientFrame::Join { username, room } => Intent::Join {
                username: username.unwrap_or_default(),
                room: required(room, "room")?,
            },
            ClientFrame::Message { username, room, msg } => Intent::Message {
                username: username.unwrap_or_default(),
                room: required(room, "room")?,
                text: non_blank(msg, "msg")?,
            },
            ClientFrame::Leave { username, room } => Intent::Leave {
                username: username.unwrap_or_default(),
                room: required(room, "room")?,
            },
        })
    }

    pub fn username(&self) -> &str {
        match self {
            Intent::Join { username, .. }
            | Intent::Message { username, .. }
            | Intent::Leave { username, .. } => username,
        }
    }

    /// Replaces the claimed username with one established by the session.
    pub fn with_identity(mut self, identity: &str) -> Intent {
        match &mut self {
            Intent::Join { username, .. }
            | Intent::Message { username, .. }
            | Intent::Leave { username, .. } => *username = identity.to_owned(),
        }
        self
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ChatError> {
    non_blank(value, field).map(|v| v.trim().to_owned())
}

/// Rejects missing or whitespace-only values, keeping the rest verbatim.
fn non_blank(value: Option<String>, field: &str) -> Result<String, ChatError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ChatError::Malformed(format!("{field} required"))),
    }
}

/// Everything the server pushes down a socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    History {
        messages: Vec<MessageRecord>,
    },
    Status {
        msg: String,
    },
    Message {
        username: String,
        msg: String,
        #[serde(with = "time::serde::rfc3339")]
        ts: OffsetDateTime,
    },
    Presence {
        online: Vec<String>,
    },
    Error {
        msg: String,
    },
}

impl ServerEvent {
    pub fn status(msg: impl Into<String>) -> ServerEvent {
        ServerEvent::Status { msg: msg.into() }
    }

    pub fn error(msg: impl Into<String>) -> ServerEvent {
        ServerEvent::Error { msg: msg.into() }
    }
}

impl From<&MessageRecord> for ServerEvent {
    fn from(record: &MessageRecord) -> Self {
        ServerEvent::Message {
            username: record.username.clone(),
            msg: record.msg.clone(),
            ts: record.ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_each_intent() {
        assert_eq!(
            Intent::decode(r#"{"type":"join","username":"alice","room":"main"}"#).unwrap(),
            Intent::Join { username: "alice".into(), room: "main".into() }
        );
        assert_eq!(
            Intent::decode(r#"{"type":"message","identity":"alice","room":"main","text":"hi"}"#).unwrap(),
            Intent::Message { username: "alice".into(), room: "main".into(), text: "hi".into() }
        );
        assert_eq!(
            Intent::decode(r#"{"type":"leave","room":"pm:1:2"}"#).unwrap(),
            Intent::Leave { username: String::new(), room: "pm:1:2".into() }
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        for frame in [
            "not json",
            r#"{"type":"shout","room":"main"}"#,
            r#"{"type":"join","username":"alice"}"#,
            r#"{"type":"join","username":"alice","room":"   "}"#,
            r#"{"type":"message","username":"alice","room":"main"}"#,
            r#"{"type":"message","username":"alice","room":"main","msg":""}"#,
        ] {
            assert!(
                matches!(Intent::decode(frame), Err(ChatError::Malformed(_))),
                "accepted {frame}"
            );
        }
    }

    #[test]
    fn message_text_is_kept_verbatim() {
        let intent = Intent::decode(
            r#"{"type":"message","username":"alice","room":" main ","msg":"    let x = 1;\n"}"#,
        )
        .unwrap();
        assert_eq!(
            intent,
            Intent::Message {
                username: "alice".into(),
                room: "main".into(),
                text: "    let x = 1;\n".into(),
            }
        );

        assert!(Intent::decode(r#"{"type":"message","username":"alice","room":"main","msg":" \n\t"}"#).is_err());
    }

    #[test]
    fn session_identity_overrides_claimed_username() {
        let intent = Intent::decode(r#"{"type":"join","username":"mallory","room":"main"}"#)
            .unwrap()
            .with_identity("alice");
        assert_eq!(intent.username(), "alice");
    }

    #[test]
    fn events_are_tagged_by_type() {
        let event = ServerEvent::Presence { online: vec!["alice".into()] };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "presence", "online": ["alice"] })
        );

        let record = MessageRecord {
            id: 7,
            username: "bob".into(),
            room: "main".into(),
            msg: "yo".into(),
            ts: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(
            serde_json::to_value(ServerEvent::from(&record)).unwrap(),
            json!({ "type": "message", "username": "bob", "msg": "yo", "ts": "1970-01-01T00:00:00Z" })
        );
        assert_eq!(
            serde_json::to_value(ServerEvent::History { messages: vec![record] }).unwrap()["messages"][0]["room"],
            "main"
        );
    }
}
