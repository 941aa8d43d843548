mod friends;
mod graph;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use graph::{Answer, Friend, IncomingRequest, SocialGraph};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/friends", get(friends::list).post(friends::send_request))
        .route("/friends/respond", post(friends::respond))
        .route("/api/friends", get(friends::with_previews))
}
