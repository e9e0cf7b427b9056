use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{AdminUser, AuthUser},
    error::AppError,
    state::AppState,
    users::{
        dto::CreateUserRequest,
        repo_types::{PublicUser, Role},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/me", get(get_me))
        .route("/users/:id", delete(delete_user))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = state.store.list_public().await?;
    Ok(Json(users))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.id))]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let missing = || AppError::Validation("Missing required user data.".into());
    let Json(payload) = payload.map_err(|_| missing())?;
    let (Some(username), Some(password), Some(role)) =
        (payload.username, payload.password, payload.role)
    else {
        return Err(missing());
    };
    let role: Role = role
        .parse()
        .map_err(|_| AppError::Validation("Role must be 'user' or 'admin'.".into()))?;

    match state.store.create(&username, role, &password).await? {
        Some(user) => Ok((StatusCode::CREATED, Json(user))),
        None => {
            warn!(%username, "username already exists");
            Err(AppError::Conflict("Username already exists.".into()))
        }
    }
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if id == admin.id {
        warn!("admin attempted to delete own account");
        return Err(AppError::Forbidden("You cannot delete your own account.".into()));
    }
    if !state.store.delete_by_id(&id).await? {
        return Err(AppError::NotFound("User not found.".into()));
    }
    info!(user_id = %id, "user removed by admin");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.into())
}
