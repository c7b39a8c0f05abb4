// Account form validation
// Runs before any network call; mirrors the server's account rules

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::turnstile::BotToken;
use crate::error::{AuthError, Result};
use crate::models::api::RegisterRequest;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static USERNAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;
const NAME_MIN: usize = 2;
const PASSWORD_MIN: usize = 8;

/// Registration form as typed by the user
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Registration {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// Check every field, collecting the first failed rule of each
    pub fn validate(&self) -> Result<()> {
        let mut fields = BTreeMap::new();

        if let Some(message) = check_email(&self.email) {
            fields.insert("email".to_string(), message.to_string());
        }
        if let Some(message) = check_password(&self.password) {
            fields.insert("password".to_string(), message.to_string());
        }
        if let Some(message) = non_blank(&self.username).and_then(check_username) {
            fields.insert("username".to_string(), message.to_string());
        }
        if let Some(message) = non_blank(&self.first_name)
            .and_then(|name| check_name(name, "First name must be at least 2 characters"))
        {
            fields.insert("first_name".to_string(), message.to_string());
        }
        if let Some(message) = non_blank(&self.last_name)
            .and_then(|name| check_name(name, "Last name must be at least 2 characters"))
        {
            fields.insert("last_name".to_string(), message.to_string());
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation { fields })
        }
    }

    /// Wire body for `POST /auth/register`; blank optional fields are dropped
    pub fn into_request(self, token: BotToken) -> RegisterRequest {
        RegisterRequest {
            email: self.email.trim().to_string(),
            password: self.password,
            turnstile_token: token.as_str().to_string(),
            username: non_blank(&self.username).map(str::to_string),
            first_name: non_blank(&self.first_name).map(str::to_string),
            last_name: non_blank(&self.last_name).map(str::to_string),
        }
    }
}

/// Reset-password form: both entries must match and meet the server's minimum
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<()> {
    if password != confirmation {
        return Err(AuthError::invalid_field(
            "confirm_password",
            "Passwords do not match",
        ));
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err(AuthError::invalid_field(
            "password",
            "Password must be at least 8 characters long",
        ));
    }
    Ok(())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn check_email(email: &str) -> Option<&'static str> {
    if EMAIL_PATTERN.is_match(email.trim()) {
        None
    } else {
        Some("Invalid email address")
    }
}

fn check_password(password: &str) -> Option<&'static str> {
    if password.chars().count() < PASSWORD_MIN {
        Some("Password must be at least 8 characters")
    } else if !password.chars().any(|c| c.is_ascii_uppercase()) {
        Some("Password must contain at least one uppercase letter")
    } else if !password.chars().any(|c| c.is_ascii_lowercase()) {
        Some("Password must contain at least one lowercase letter")
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        Some("Password must contain at least one number")
    } else {
        None
    }
}

fn check_username(username: &str) -> Option<&'static str> {
    let len = username.chars().count();
    if len < USERNAME_MIN {
        Some("Username must be at least 3 characters")
    } else if len > USERNAME_MAX {
        Some("Username must be at most 30 characters")
    } else if !USERNAME_PATTERN.is_match(username) {
        Some("Username can only contain letters, numbers, underscores, and hyphens")
    } else if username.starts_with('_') || username.starts_with('-') {
        Some("Username cannot start with _ or -")
    } else {
        None
    }
}

fn check_name(name: &str, message: &'static str) -> Option<&'static str> {
    if name.chars().count() < NAME_MIN {
        Some(message)
    } else {
        None
    }
}
