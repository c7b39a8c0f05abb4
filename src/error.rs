// Error handling module
// Defines the error type returned by session and login operations

use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::api::ServerError;

/// Message published when a refresh fails and the session is dropped
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

/// Errors surfaced to callers of the session manager
#[derive(Error, Debug)]
pub enum AuthError {
    /// Field-scoped validation failure (client-side checks or server 422)
    #[error("Validation failed: {}", describe_fields(.fields))]
    Validation { fields: BTreeMap<String, String> },

    /// Server refused the request (bad credentials, invalid link, ...)
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Refresh failed and the session was cleared
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    /// Operation needs a signed-in user
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Bot-verification token missing or already used
    #[error("Please complete the verification")]
    MissingVerification,

    /// Magic-link page opened without a token
    #[error("No verification token found")]
    MissingLinkToken,

    /// Email-verification page opened without a token
    #[error("No verification token provided")]
    MissingEmailToken,

    /// Password-reset page opened without a token
    #[error("Invalid or missing reset token")]
    MissingResetToken,

    /// Google provider flow failed or was cancelled
    #[error("Google sign-in failed: {0}")]
    OAuth(String),

    /// Transport failure (connect, timeout, body)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    Parse(String),
}

impl AuthError {
    /// Build an error from a non-2xx response body
    ///
    /// `fallback` is used when the body carries no usable `detail`.
    pub fn from_response(status: u16, body: &[u8], fallback: &str) -> Self {
        match ServerError::parse(body) {
            ServerError::Fields(fields) => AuthError::Validation { fields },
            ServerError::Message(message) => AuthError::Rejected { status, message },
            ServerError::Unspecified => AuthError::Rejected {
                status,
                message: fallback.to_string(),
            },
        }
    }

    /// Single-field validation error
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.to_string());
        AuthError::Validation { fields }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AuthError::Validation { .. })
    }

    /// Message attached to a specific form field, if any
    pub fn field_message(&self, field: &str) -> Option<&str> {
        match self {
            AuthError::Validation { fields } => fields.get(field).map(String::as_str),
            _ => None,
        }
    }

    /// HTTP status of a server rejection
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Rejected { status, .. } => Some(*status),
            AuthError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

fn describe_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, AuthError>;
