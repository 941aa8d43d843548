//! Keys stored in the cookie session once a user has authenticated.

pub const USER_ID: &str = "user_id";
pub const USERNAME: &str = "username";
