use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_sessions::Session;

use crate::{
    accounts::AccountStore,
    auth::current_user,
    realtime::{MessageLog, SqliteMessageLog},
    AppResult, AppState,
};

use super::{Answer, Friend, IncomingRequest, SocialGraph};

#[derive(Serialize)]
pub(crate) struct FriendsPage {
    friends: Vec<Friend>,
    incoming: Vec<IncomingRequest>,
}

#[derive(Deserialize)]
pub(crate) struct FriendRequestBody {
    #[serde(default)]
    username: String,
}

#[derive(Deserialize)]
pub(crate) struct RespondBody {
    request_id: i64,
    action: Answer,
}

#[derive(Serialize)]
pub(crate) struct Preview {
    msg: String,
    #[serde(with = "time::serde::rfc3339")]
    ts: OffsetDateTime,
    username: String,
}

#[derive(Serialize)]
pub(crate) struct FriendWithPreview {
    #[serde(flatten)]
    friend: Friend,
    last: Option<Preview>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(accounts): State<AccountStore>,
    State(social): State<SocialGraph>,
    session: Session,
) -> AppResult<Json<FriendsPage>> {
    let me = current_user(&session, &accounts).await?;

    Ok(Json(FriendsPage {
        friends: social.friends(&me).await?,
        incoming: social.incoming(&me).await?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_request(
    State(accounts): State<AccountStore>,
    State(social): State<SocialGraph>,
    session: Session,

    Json(FriendRequestBody { username }): Json<FriendRequestBody>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let me = current_user(&session, &accounts).await?;
    let request_id = social.send_request(&me, &username).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "request_id": request_id, "to": username.trim() })),
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn respond(
    State(accounts): State<AccountStore>,
    State(social): State<SocialGraph>,
    session: Session,

    Json(RespondBody { request_id, action }): Json<RespondBody>,
) -> AppResult<StatusCode> {
    let me = current_user(&session, &accounts).await?;
    social.respond(&me, request_id, action).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Friends with the last message of each private room, for the sidebar.
#[debug_handler(state = AppState)]
pub(crate) async fn with_previews(
    State(accounts): State<AccountStore>,
    State(social): State<SocialGraph>,
    State(messages): State<SqliteMessageLog>,
    session: Session,
) -> AppResult<Json<serde_json::Value>> {
    let me = current_user(&session, &accounts).await?;

    let mut out = Vec::new();
    for friend in social.friends(&me).await? {
        let last = messages.latest(&friend.room).await?.map(|record| Preview {
            msg: record.msg,
            ts: record.ts,
            username: record.username,
        });
        out.push(FriendWithPreview { friend, last });
    }

    Ok(Json(serde_json::json!({ "friends": out })))
}
