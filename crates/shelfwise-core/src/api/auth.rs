use serde::{Deserialize, Serialize};

use crate::api::users::UserProfile;

const FLAG_ON: &str = "1";
const FLAG_OFF: &str = "0";

/// Trims surrounding whitespace and lower-cases the address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
    pub username: Option<String>,
}

impl LoginCredentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            remember_me: false,
            username: None,
        }
    }

    #[must_use]
    pub fn remember(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn to_request(&self) -> LoginRequest {
        LoginRequest {
            email: normalize_email(&self.email),
            password: self.password.clone(),
            remember: if self.remember_me { FLAG_ON } else { FLAG_OFF }.to_string(),
            username: self
                .username
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub remember: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub user: Option<UserProfile>,
    pub access_expires: i64,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

impl RegisterRequest {
    #[must_use]
    pub fn new(username: &str, email: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            email: normalize_email(email),
            password: password.to_string(),
            password_confirm: password.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<String>,
}

impl RefreshRequest {
    #[must_use]
    pub fn new(remembering: bool) -> Self {
        Self {
            remember: remembering.then(|| FLAG_ON.to_string()),
        }
    }

    /// Whether the request carries anything worth sending as a body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.remember.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_expires: i64,
    #[serde(default)]
    pub rotated: bool,
}
