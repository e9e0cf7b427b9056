use serde::{Deserialize, Serialize};

use crate::users::repo_types::Role;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // user ID
    pub username: String, // as of issuance, informational only
    pub role: Role,       // as of issuance, informational only
    pub iat: usize,       // issued at (unix timestamp)
    pub exp: usize,       // expires at (unix timestamp)
}
