use serde::Deserialize;

/// Request body for `POST /users`. `role` stays a string until validated.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}
