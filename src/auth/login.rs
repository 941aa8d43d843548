use axum::{debug_handler, extract::State, Json};
use tower_sessions::Session;
use tracing::{info, warn};

use crate::{accounts::AccountStore, AppResult, AppState};

use super::{sign_in, Credentials, Me};

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(accounts): State<AccountStore>,
    session: Session,

    Json(Credentials { username, password }): Json<Credentials>,
) -> AppResult<Json<Me>> {
    let user = match accounts.authenticate(&username, &password).await {
        Ok(user) => user,
        Err(err) => {
            warn!(username = username.trim(), %err, "login refused");
            return Err(err.into());
        }
    };

    sign_in(&session, &user).await?;
    info!(user_id = user.id, username = %user.username, "logged in");

    Ok(Json(user.into()))
}
