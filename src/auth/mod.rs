mod login;
mod logout;
mod register;

use axum::{debug_handler, extract::State, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{accounts::AccountStore, db::User, error::AccountError, session::{USERNAME, USER_ID}, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register::register))
        .route("/login", post(login::login))
        .route("/logout", get(logout::logout).post(logout::logout))
        .route("/api/me", get(me))
}

#[derive(Deserialize)]
pub(crate) struct Credentials {
    #[serde(default)]
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct Me {
    id: i64,
    username: String,
}

impl From<User> for Me {
    fn from(User { id, username, .. }: User) -> Self {
        Me { id, username }
    }
}

pub(crate) async fn sign_in(session: &Session, user: &User) -> AppResult<()> {
    session.cycle_id().await?;
    session.insert(USER_ID, user.id).await?;
    session.insert(USERNAME, &user.username).await?;
    Ok(())
}

/// The logged-in user, or `NotLoggedIn` when the session is empty or stale.
pub(crate) async fn current_user(session: &Session, accounts: &AccountStore) -> AppResult<User> {
    let Some(username) = session.get::<String>(USERNAME).await? else {
        return Err(AccountError::NotLoggedIn.into());
    };

    Ok(accounts
        .find_by_username(&username)
        .await?
        .ok_or(AccountError::NotLoggedIn)?)
}

#[debug_handler(state = AppState)]
async fn me(
    State(accounts): State<AccountStore>,
    session: Session,
) -> AppResult<Json<Me>> {
    Ok(Json(current_user(&session, &accounts).await?.into()))
}
