use std::future::Future;

use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{db::MessageRecord, error::ChatError};

/// Append-and-fetch access to persisted chat messages.
///
/// Implementations own their timeout policy; callers assume every call
/// eventually resolves.
pub trait MessageLog: Send + Sync {
    /// Durably records a message and returns it with its id and timestamp.
    fn append(
        &self,
        room: &str,
        username: &str,
        text: &str,
    ) -> impl Future<Output = Result<MessageRecord, ChatError>> + Send;

    /// Up to `limit` of the newest messages in `room`, oldest first.
    fn recent(
        &self,
        room: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, ChatError>> + Send;

    fn latest(
        &self,
        room: &str,
    ) -> impl Future<Output = Result<Option<MessageRecord>, ChatError>> + Send;
}

#[derive(Debug, Clone)]
pub struct SqliteMessageLog {
    db_pool: SqlitePool,
}

impl SqliteMessageLog {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }
}

impl MessageLog for SqliteMessageLog {
    async fn append(&self, room: &str, username: &str, text: &str) -> Result<MessageRecord, ChatError> {
        let record = sqlx::query_as(
            "INSERT INTO messages (username,room,msg,ts) VALUES (?,?,?,?)
             RETURNING id,username,room,msg,ts",
        )
        .bind(username)
        .bind(room)
        .bind(text)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.db_pool)
        .await?;

        Ok(record)
    }

    async fn recent(&self, room: &str, limit: u32) -> Result<Vec<MessageRecord>, ChatError> {
        let records = sqlx::query_as(
            "SELECT id,username,room,msg,ts FROM (
                SELECT id,username,room,msg,ts FROM messages WHERE room=? ORDER BY id DESC LIMIT ?
             ) ORDER BY id ASC",
        )
        .bind(room)
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(records)
    }

    async fn latest(&self, room: &str) -> Result<Option<MessageRecord>, ChatError> {
        let record = sqlx::query_as(
            "SELECT id,username,room,msg,ts FROM messages WHERE room=? ORDER BY id DESC LIMIT 1",
        )
        .bind(room)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn message_log() -> SqliteMessageLog {
        SqliteMessageLog::new(db::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let log = message_log().await;
        let first = log.append("main", "alice", "hi").await.unwrap();
        let second = log.append("main", "bob", "hey").await.unwrap();

        assert!(second.id > first.id);
        assert!(second.ts >= first.ts);
        assert_eq!(first.room, "main");
        assert_eq!(first.username, "alice");
        assert_eq!(first.msg, "hi");
    }

    #[tokio::test]
    async fn recent_of_empty_room_is_empty() {
        let log = message_log().await;
        assert!(log.recent("main", 100).await.unwrap().is_empty());
        assert!(log.latest("main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_returns_newest_window_in_ascending_order() {
        let log = message_log().await;
        for i in 0..105 {
            log.append("main", "alice", &format!("m{i}")).await.unwrap();
        }
        log.append("other", "bob", "elsewhere").await.unwrap();

        let recent = log.recent("main", 100).await.unwrap();
        assert_eq!(recent.len(), 100);
        assert_eq!(recent.first().unwrap().msg, "m5");
        assert_eq!(recent.last().unwrap().msg, "m104");
        assert!(recent.windows(2).all(|w| w[0].id < w[1].id));
        assert!(recent.iter().all(|r| r.room == "main"));

        assert_eq!(log.latest("main").await.unwrap().unwrap().msg, "m104");
    }

    #[tokio::test]
    async fn recent_returns_fewer_than_limit() {
        let log = message_log().await;
        log.append("pm:1:2", "alice", "one").await.unwrap();
        log.append("pm:1:2", "bob", "two").await.unwrap();

        let recent = log.recent("pm:1:2", 100).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|r| r.msg.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[tokio::test]
    async fn closed_pool_fails_instead_of_hanging() {
        let db_pool = db::in_memory().await.unwrap();
        let log = SqliteMessageLog::new(db_pool.clone());
        db_pool.close().await;

        assert!(matches!(log.append("main", "alice", "hi").await, Err(ChatError::Log(_))));
    }
}
