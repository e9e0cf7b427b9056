use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::{
    auth::jwt::JwtKeys,
    error::AppError,
    state::AppState,
    users::{
        repo::UserStore,
        repo_types::{Role, User},
    },
};

/// Request guard failures. All of them are 401 except `Forbidden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication token is missing.")]
    MissingToken,
    #[error("Bearer token malformed.")]
    MalformedToken,
    #[error("Token has expired.")]
    Expired,
    #[error("Invalid token.")]
    Invalid,
    #[error("{0} privileges required.")]
    Forbidden(Role),
}

/// Pulls the token out of `Authorization: <scheme> <token>`.
/// The scheme word itself is not checked.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedToken)?;
    let token = value.split(' ').nth(1).ok_or(AuthError::MalformedToken)?;
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Verifies the request's token and resolves its subject to the live record.
///
/// The returned user is whatever the store holds now; username and role in
/// the token are not compared against it.
pub async fn authenticate(
    headers: &HeaderMap,
    keys: &JwtKeys,
    store: &UserStore,
) -> Result<User, AppError> {
    let token = bearer_token(headers)?;
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "token rejected");
        e
    })?;
    match store.find_by_id(&claims.sub).await? {
        Some(user) => Ok(user),
        None => {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            Err(AuthError::Invalid.into())
        }
    }
}

pub fn require_role(user: &User, role: Role) -> Result<(), AuthError> {
    if user.role == role {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = %user.role, required = %role, "role check failed");
        Err(AuthError::Forbidden(role))
    }
}

/// Any authenticated user.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = authenticate(&parts.headers, &state.keys, &state.store).await?;
        Ok(AuthUser(user))
    }
}

/// Authenticated user whose live role is `admin`. Authentication always runs
/// first, so a request without a token gets 401, never 403.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        require_role(&user, Role::Admin)?;
        Ok(AdminUser(user))
    }
}
