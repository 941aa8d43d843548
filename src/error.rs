use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised by the realtime core.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message log: {0}")]
    Log(#[from] sqlx::Error),

    #[error("malformed intent: {0}")]
    Malformed(String),
}

/// Errors raised by the account store and the auth routes.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("username required")]
    UsernameRequired,

    #[error("username must be at least {0} characters")]
    UsernameTooShort(usize),

    #[error("password required")]
    PasswordRequired,

    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("username already taken")]
    UsernameTaken,

    #[error("unknown user, register first")]
    UnknownUser,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl AccountError {
    pub fn status(&self) -> StatusCode {
        use AccountError::*;
        match self {
            UsernameRequired | UsernameTooShort(_) | PasswordRequired | PasswordTooShort(_) => {
                StatusCode::BAD_REQUEST
            }
            UsernameTaken => StatusCode::CONFLICT,
            UnknownUser | InvalidCredentials | NotLoggedIn => StatusCode::UNAUTHORIZED,
            Hash(_) | Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors raised by the social graph store and the friends routes.
#[derive(Debug, Error)]
pub enum SocialError {
    #[error("friend username required")]
    TargetRequired,

    #[error("cannot add yourself")]
    SelfRequest,

    #[error("user {0} not found")]
    UnknownUser(String),

    #[error("{0} is already your friend")]
    AlreadyFriends(String),

    #[error("friend request already sent")]
    AlreadyPending,

    #[error("request not found")]
    RequestNotFound,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl SocialError {
    pub fn status(&self) -> StatusCode {
        use SocialError::*;
        match self {
            TargetRequired | SelfRequest => StatusCode::BAD_REQUEST,
            UnknownUser(_) | RequestNotFound => StatusCode::NOT_FOUND,
            AlreadyFriends(_) | AlreadyPending => StatusCode::CONFLICT,
            Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
