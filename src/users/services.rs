use std::sync::Arc;

use axum::extract::FromRef;
use tracing::info;

use crate::{
    auth::{repo::UserStore, repo_types::User},
    db::StoreError,
    error::ApiError,
    state::AppState,
};

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("user not found")]
    NotFound,
    #[error("user already exists")]
    AlreadyExists,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for UserError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => UserError::AlreadyExists,
            other => UserError::Store(other),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Validation(msg) => ApiError::bad_request(msg),
            UserError::NotFound => ApiError::NotFound("user not found"),
            UserError::AlreadyExists => ApiError::bad_request("user already exists"),
            UserError::Store(e) => ApiError::from(e),
        }
    }
}

/// Account operations on the authenticated user's own record.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone())
    }
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn profile(&self, user_id: i64) -> Result<User, UserError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound)
    }

    pub async fn update_username(&self, user_id: i64, username: &str) -> Result<User, UserError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UserError::Validation("username cannot be empty"));
        }
        let user = self
            .users
            .update_username(user_id, username)
            .await?
            .ok_or(UserError::NotFound)?;
        info!(user_id, username = %user.username, "username changed");
        Ok(user)
    }

    /// Irreversible. The schema drops the user's expenses with the account.
    pub async fn delete(&self, user_id: i64) -> Result<(), UserError> {
        if !self.users.delete(user_id).await? {
            return Err(UserError::NotFound);
        }
        info!(user_id, "user deleted");
        Ok(())
    }
}
