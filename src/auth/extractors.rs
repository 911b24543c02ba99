use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::services::AuthService;
use crate::error::ApiError;

/// Identity of the caller, attached to the request by `require_auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

/// Gate for protected routes: resolves the bearer token to a user id and
/// stores it in the request extensions. Rejections never reach `next`.
pub async fn require_auth(
    State(auth): State<AuthService>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let user_id = auth
        .validate_token(token)
        .map_err(|_| ApiError::Unauthorized("invalid token"))?;

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}

/// Expects `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(ApiError::Unauthorized("authorization header is required"))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized("invalid authorization format"))
}

/// The user id `require_auth` attached, or `Unauthorized` on an ungated route.
pub fn current_user_id(extensions: &Extensions) -> Result<i64, ApiError> {
    extensions
        .get::<AuthUser>()
        .map(|user| user.0)
        .ok_or(ApiError::Unauthorized("unauthorized"))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user_id(&parts.extensions).map(AuthUser)
    }
}
