use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::SqlitePool;
use tracing::info;

use crate::{db::User, error::AccountError};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Users and their credentials.
#[derive(Debug, Clone)]
pub struct AccountStore {
    db_pool: SqlitePool,
}

impl AccountStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, AccountError> {
        let user = sqlx::query_as("SELECT id,username,password_hash FROM users WHERE username=?")
            .bind(username)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, AccountError> {
        let user = sqlx::query_as("SELECT id,username,password_hash FROM users WHERE id=?")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(user)
    }

    pub async fn create(&self, username: &str, password_hash: &str) -> Result<User, AccountError> {
        let user = sqlx::query_as(
            "INSERT INTO users (username,password_hash) VALUES (?,?) RETURNING id,username,password_hash",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AccountError::UsernameTaken,
            err => AccountError::Storage(err),
        })?;
        Ok(user)
    }

    pub async fn verify(&self, username: &str, password: &str) -> Result<bool, AccountError> {
        Ok(self
            .find_by_username(username)
            .await?
            .is_some_and(|user| password_matches(&user, password)))
    }

    /// Validates and creates a new account.
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AccountError::UsernameRequired);
        }
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(AccountError::UsernameTooShort(MIN_USERNAME_LEN));
        }
        if password.is_empty() {
            return Err(AccountError::PasswordRequired);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::PasswordTooShort(MIN_PASSWORD_LEN));
        }
        if self.find_by_username(username).await?.is_some() {
            return Err(AccountError::UsernameTaken);
        }

        let user = self.create(username, &hash_password(password)?).await?;
        info!(user_id = user.id, username = %user.username, "registered");
        Ok(user)
    }

    /// Looks up the user and checks the password, telling unknown users apart.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AccountError::UsernameRequired);
        }
        if password.is_empty() {
            return Err(AccountError::PasswordRequired);
        }

        let user = self
            .find_by_username(username)
            .await?
            .ok_or(AccountError::UnknownUser)?;
        if !password_matches(&user, password) {
            return Err(AccountError::InvalidCredentials);
        }
        Ok(user)
    }
}

pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|err| AccountError::Hash(err.to_string()))?;

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AccountError::Hash(err.to_string()))?
        .to_string())
}

fn password_matches(user: &User, password: &str) -> bool {
    let Some(hash) = user.password_hash.as_deref() else {
        return false;
    };
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}
