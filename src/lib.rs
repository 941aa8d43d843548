pub mod accounts;
pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod realtime;
pub mod session;
pub mod social;

use std::sync::Arc;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult};

use accounts::AccountStore;
use realtime::{Chat, SqliteMessageLog};
use social::SocialGraph;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub accounts: AccountStore,
    pub social: SocialGraph,
    pub messages: SqliteMessageLog,
    pub chat: Arc<Chat>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool) -> Self {
        let messages = SqliteMessageLog::new(db_pool.clone());

        AppState {
            accounts: AccountStore::new(db_pool.clone()),
            social: SocialGraph::new(db_pool),
            chat: Arc::new(Chat::new(messages.clone())),
            messages,
        }
    }
}

/// Every route, without the session layer.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(social::router())
        .merge(realtime::router())
        .with_state(app_state)
}
