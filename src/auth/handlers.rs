use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::dto::{LoginRequest, LoginResponse},
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let missing = || AppError::Validation("Username and password are required.".into());
    let Json(payload) = payload.map_err(|_| missing())?;
    let (Some(username), Some(password)) = (payload.username, payload.password) else {
        return Err(missing());
    };

    let user = match state.store.find_by_username(&username).await? {
        Some(u) => u,
        None => {
            warn!(%username, "login unknown username");
            return Err(AppError::InvalidCredentials);
        }
    };

    // plain-text comparison, see User
    if user.password != password {
        warn!(%username, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.keys.sign(&user)?;

    info!(user_id = %user.id, %username, "user logged in");
    Ok(Json(LoginResponse {
        token,
        id: user.id,
        username: user.username,
        role: user.role,
    }))
}
