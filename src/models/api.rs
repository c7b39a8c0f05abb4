// Wire formats of the auth endpoints

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::user::User;

// ==================================================================================================
// Request Models
// ==================================================================================================

#[derive(Debug, Serialize)]
pub struct PasswordLoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub turnstile_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct GoogleLoginRequest<'a> {
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct MagicLinkRequest<'a> {
    pub email: &'a str,
    pub turnstile_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordRequest<'a> {
    pub token: &'a str,
    pub new_password: &'a str,
}

/// Body of `POST /auth/register`; optional fields are left out when blank
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub turnstile_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

// ==================================================================================================
// Response Models
// ==================================================================================================

/// `{access_token, user}` returned by every endpoint that establishes a session
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: User,
}

/// `{message}` returned by endpoints that do not touch the session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /auth/verify-email/{token}`
///
/// Current servers sign the visitor in and send `{access_token, user}`;
/// older ones only confirm with a message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailVerificationResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

impl EmailVerificationResponse {
    /// The session carried by the response, if it has both halves
    pub fn into_session(self) -> Option<SessionResponse> {
        match (self.access_token.filter(|t| !t.is_empty()), self.user) {
            (Some(access_token), Some(user)) => Some(SessionResponse {
                access_token,
                token_type: self.token_type,
                user,
            }),
            _ => None,
        }
    }
}

/// Response of `PUT /user/profile`
///
/// The server reports the picture as `profile_picture_url` here while the
/// session endpoints call it `image`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdateResponse {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl ProfileUpdateResponse {
    /// Merge the returned fields into the cached user; absent fields keep their value
    pub fn apply_to(&self, user: &mut User) {
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if self.username.is_some() {
            user.username = self.username.clone();
        }
        if self.first_name.is_some() {
            user.first_name = self.first_name.clone();
        }
        if self.last_name.is_some() {
            user.last_name = self.last_name.clone();
        }
        if self.profile_picture_url.is_some() {
            user.image = self.profile_picture_url.clone();
        }
        if self.subscription_tier.is_some() {
            user.subscription_tier = self.subscription_tier.clone().into();
        }
    }
}

// ==================================================================================================
// Error Bodies
// ==================================================================================================

/// Error body in the FastAPI shape: `{"detail": "..."}` or `{"detail": [{loc, msg}]}`
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
}

impl FieldError {
    /// Field name is the last segment of `loc`, e.g. `["body", "username"]`
    pub fn field(&self) -> String {
        self.loc
            .last()
            .map(|segment| match segment {
                serde_json::Value::String(name) => name.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "form".to_string())
    }
}

/// Server error reduced to what the caller can display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    Message(String),
    Fields(BTreeMap<String, String>),
    Unspecified,
}

impl ServerError {
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(ErrorBody {
                detail: Some(ErrorDetail::Message(message)),
            }) if !message.trim().is_empty() => ServerError::Message(message),
            Ok(ErrorBody {
                detail: Some(ErrorDetail::Fields(errors)),
            }) if !errors.is_empty() => {
                let mut fields = BTreeMap::new();
                for error in errors {
                    fields.entry(error.field()).or_insert(error.msg);
                }
                ServerError::Fields(fields)
            }
            _ => ServerError::Unspecified,
        }
    }
}
