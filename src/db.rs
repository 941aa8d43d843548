use std::str::FromStr;

use serde::Serialize;
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, FromRow, SqlitePool};
use time::OffsetDateTime;
use tracing::info;

use crate::config::Config;

/// One persisted chat message. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct MessageRecord {
    pub id: i64,
    pub username: String,
    pub room: String,
    pub msg: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    // legacy rows predate password auth
    pub password_hash: Option<String>,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        room TEXT NOT NULL DEFAULT 'main',
        msg TEXT NOT NULL,
        ts DATETIME NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS messages_room_id ON messages (room, id)",
    "CREATE TABLE IF NOT EXISTS friendships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users (id),
        friend_id INTEGER NOT NULL REFERENCES users (id),
        UNIQUE (user_id, friend_id)
    )",
    "CREATE TABLE IF NOT EXISTS friend_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        requester_id INTEGER NOT NULL REFERENCES users (id),
        recipient_id INTEGER NOT NULL REFERENCES users (id),
        status TEXT NOT NULL DEFAULT 'pending',
        created_at DATETIME NOT NULL,
        UNIQUE (requester_id, recipient_id)
    )",
];

const LEGACY_USER_TABLES: [&str; 2] = ["user", "users"];

pub async fn connect(config: &Config) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.db_timeout);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_timeout)
        .connect_with(options)
        .await?;

    setup_schema(&db_pool).await?;
    Ok(db_pool)
}

/// Single-connection in-memory database with the schema applied.
pub async fn in_memory() -> Result<SqlitePool, sqlx::Error> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
        .await?;

    setup_schema(&db_pool).await?;
    Ok(db_pool)
}

pub async fn setup_schema(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }

    // older databases may also carry the singular `user` table
    for table in LEGACY_USER_TABLES {
        let columns: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(db_pool)
            .await?;
        if !columns.is_empty() && !columns.iter().any(|(name,)| name == "password_hash") {
            info!(table, "adding password_hash to legacy database");
            sqlx::query(&format!("ALTER TABLE \"{table}\" ADD COLUMN password_hash TEXT"))
                .execute(db_pool)
                .await?;
        }
    }

    Ok(())
}
