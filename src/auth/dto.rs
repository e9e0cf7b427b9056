use serde::{Deserialize, Serialize};

use crate::users::repo_types::Role;

/// Request body for login. Fields are optional so a missing one maps to 400
/// instead of the extractor's default rejection.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub id: String,
    pub username: String,
    pub role: Role,
}
