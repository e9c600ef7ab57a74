// Authentication types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh credential pair issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Authenticated user identity (`GET /auth/profile/`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Full name if the profile has one, username otherwise
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login answers with a bare token pair
pub type LoginResponse = TokenPair;

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub user: User,
    pub tokens: TokenPair,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// Logout body; `refresh` is null when no refresh token is stored
#[derive(Debug, Serialize)]
pub struct LogoutRequest {
    pub refresh: Option<String>,
}
