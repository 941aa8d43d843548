use axum::{debug_handler, http::StatusCode};
use tower_sessions::Session;
use tracing::info;

use crate::{session::USERNAME, AppResult};

#[debug_handler]
pub(crate) async fn logout(
    session: Session
) -> AppResult<StatusCode> {
    if let Some(username) = session.get::<String>(USERNAME).await? {
        info!(%username, "logged out");
    }
    session.flush().await?;

    Ok(StatusCode::NO_CONTENT)
}
