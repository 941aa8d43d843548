use axum::{debug_handler, extract::State, http::StatusCode, Json};
use tower_sessions::Session;

use crate::{accounts::AccountStore, AppResult, AppState};

use super::{sign_in, Credentials, Me};

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(accounts): State<AccountStore>,
    session: Session,

    Json(Credentials { username, password }): Json<Credentials>,
) -> AppResult<(StatusCode, Json<Me>)> {
    let user = accounts.register(&username, &password).await?;
    sign_in(&session, &user).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}
