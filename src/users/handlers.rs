use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::services::UserService;
use crate::{
    auth::{dto::PublicUser, AuthUser},
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UpdateUsernameRequest {
    pub username: String,
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user", get(get_profile).delete(delete_user))
        .route("/user/username", put(update_username))
}

#[instrument(skip(users))]
pub async fn get_profile(
    State(users): State<UserService>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = users.profile(user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(users, payload))]
pub async fn update_username(
    State(users): State<UserService>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateUsernameRequest>, JsonRejection>,
) -> Result<Json<PublicUser>, ApiError> {
    let Json(payload) = payload?;
    let user = users.update_username(user_id, &payload.username).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(users))]
pub async fn delete_user(
    State(users): State<UserService>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, ApiError> {
    users.delete(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
