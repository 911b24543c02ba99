use std::sync::Arc;

use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    auth::{
        jwt::{JwtKeys, TokenError},
        password::{hash_password, verify_password, PasswordError},
        repo::UserStore,
        repo_types::User,
    },
    db::StoreError,
    state::AppState,
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("user already exists")]
    AlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Token(TokenError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => AuthError::AlreadyExists,
            other => AuthError::Store(other),
        }
    }
}

/// Registration, login and token validation over a `UserStore`.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), state.keys.clone())
    }
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { users, keys }
    }

    /// Creates an account. The pre-check only gives the common case a cheap
    /// answer; the store's unique constraint decides concurrent registrations.
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::Validation("username is required"));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password is required"));
        }

        if self.users.find_by_username(username).await?.is_some() {
            warn!(%username, "username already registered");
            return Err(AuthError::AlreadyExists);
        }

        let plain = password.to_owned();
        let hash = run_blocking(move || hash_password(&plain)).await?;

        let user = self.users.insert(username, &hash).await.map_err(|e| {
            if matches!(e, StoreError::DuplicateUsername) {
                warn!(%username, "lost registration race on username");
            }
            AuthError::from(e)
        })?;

        info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Unknown usernames and wrong passwords both yield `InvalidCredentials`.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let username = username.trim();
        let user = match self.users.find_by_username(username).await? {
            Some(u) => u,
            None => {
                warn!(%username, "login unknown username");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let plain = password.to_owned();
        let stored = user.password_hash.clone();
        if !run_blocking(move || verify_password(&plain, &stored)).await? {
            warn!(user_id = user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.keys.sign(user.id).map_err(AuthError::Token)?;
        info!(user_id = user.id, "user logged in");
        Ok(token)
    }

    pub fn validate_token(&self, token: &str) -> Result<i64, AuthError> {
        self.keys
            .verify(token, OffsetDateTime::now_utc())
            .map_err(|reason| {
                warn!(%reason, "token rejected");
                AuthError::Unauthorized
            })
    }
}

/// Argon2 is deliberately slow; keep it off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, PasswordError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
}
