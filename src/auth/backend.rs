// Auth endpoint calls

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Serialize;
use url::Url;

use super::types::Credential;
use crate::error::{AuthError, Result};
use crate::models::api::{
    EmailVerificationResponse, ForgotPasswordRequest, GoogleLoginRequest, MagicLinkRequest,
    MessageResponse, PasswordLoginRequest, RegisterRequest, ResetPasswordRequest,
    SessionResponse,
};

/// Message returned by registration when the server sends none
pub const REGISTERED_MESSAGE: &str =
    "Account created successfully. Please check your email to verify your account.";

/// Message returned by forgot-password when the server sends none
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists with this email, you will receive password reset instructions.";

/// Message returned by reset-password when the server sends none
pub const PASSWORD_RESET_MESSAGE: &str = "Password reset successfully";

/// Network seam of the session manager
///
/// One method per auth endpoint. Session-establishing calls return the raw
/// `{access_token, user}` payload; storing it is the caller's job.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `POST /auth/token`
    async fn password_login(
        &self,
        email: &str,
        password: &str,
        turnstile_token: &str,
    ) -> Result<SessionResponse>;

    /// `POST /auth/google`
    async fn google_login(&self, provider_token: &str) -> Result<SessionResponse>;

    /// `POST /auth/magic-link`
    async fn request_magic_link(&self, email: &str, turnstile_token: &str) -> Result<()>;

    /// `GET /auth/verify-magic-link/{token}`
    async fn verify_magic_link(&self, token: &str) -> Result<SessionResponse>;

    /// `GET /auth/session`, bearer header only when a credential is held
    async fn check_session(&self, credential: Option<&Credential>) -> Result<SessionResponse>;

    /// `POST /auth/refresh`, cookie only
    async fn refresh(&self) -> Result<SessionResponse>;

    /// `POST /auth/logout`
    async fn logout(&self) -> Result<()>;

    /// `POST /auth/register`, returns the server's message
    async fn register(&self, request: &RegisterRequest) -> Result<String>;

    /// `GET /auth/verify-email/{token}`
    async fn verify_email(&self, token: &str) -> Result<EmailVerificationResponse>;

    /// `POST /auth/forgot-password`, returns the server's message
    async fn forgot_password(&self, email: &str) -> Result<String>;

    /// `POST /auth/reset-password`, returns the server's message
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<String>;
}

/// `AuthBackend` over HTTP
///
/// The client must have a cookie store: the refresh cookie set by login
/// responses travels back to `/auth/refresh` through it.
pub struct HttpAuthBackend {
    client: Client,
    api_base: String,
}

impl HttpAuthBackend {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// `path` with `segment` appended as one percent-encoded path segment
    fn segment_url(&self, path: &str, segment: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| AuthError::Parse(format!("API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AuthError::Parse("API URL cannot carry a path".to_string()))?
            .push(segment);
        Ok(url)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let url = self.url(path);
        tracing::debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Turn a response into `Ok(response)` for 2xx or a typed error
    async fn check(response: Response, fallback: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        tracing::debug!(
            status = status.as_u16(),
            body = %String::from_utf8_lossy(&body),
            "Auth endpoint returned an error"
        );
        Err(AuthError::from_response(status.as_u16(), &body, fallback))
    }

    async fn session_from(response: Response, fallback: &str) -> Result<SessionResponse> {
        let response = Self::check(response, fallback).await?;
        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Parse(format!("session payload: {}", e)))?;

        if session.access_token.is_empty() {
            return Err(AuthError::Parse(
                "session payload does not contain access_token".to_string(),
            ));
        }
        Ok(session)
    }

    /// `{message}` body of a 2xx response, `default` when absent or blank
    async fn message_from(response: Response, fallback: &str, default: &str) -> Result<String> {
        let response = Self::check(response, fallback).await?;

        // Older servers answer with the created object instead of a message
        let body = response.bytes().await?;
        let parsed: MessageResponse = serde_json::from_slice(&body).unwrap_or_default();
        Ok(parsed
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default.to_string()))
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn password_login(
        &self,
        email: &str,
        password: &str,
        turnstile_token: &str,
    ) -> Result<SessionResponse> {
        let body = PasswordLoginRequest {
            email,
            password,
            turnstile_token,
        };
        let response = self.post_json("/auth/token", &body).await?;
        Self::session_from(response, "Login failed").await
    }

    async fn google_login(&self, provider_token: &str) -> Result<SessionResponse> {
        let body = GoogleLoginRequest {
            token: provider_token,
        };
        let response = self.post_json("/auth/google", &body).await?;
        Self::session_from(response, "Google login failed").await
    }

    async fn request_magic_link(&self, email: &str, turnstile_token: &str) -> Result<()> {
        let body = MagicLinkRequest {
            email,
            turnstile_token,
        };
        let response = self.post_json("/auth/magic-link", &body).await?;
        Self::check(response, "Failed to send magic link").await?;
        Ok(())
    }

    async fn verify_magic_link(&self, token: &str) -> Result<SessionResponse> {
        let url = self.segment_url("/auth/verify-magic-link", token)?;
        let response = self.client.get(url).send().await?;
        Self::session_from(response, "Failed to verify magic link").await
    }

    async fn check_session(&self, credential: Option<&Credential>) -> Result<SessionResponse> {
        let mut request = self.client.get(self.url("/auth/session"));
        if let Some(credential) = credential {
            request = request.header(header::AUTHORIZATION, credential.bearer());
        }

        let response = request.send().await?;
        Self::session_from(response, "No active session").await
    }

    async fn refresh(&self) -> Result<SessionResponse> {
        tracing::debug!("Requesting credential renewal");

        let response = self.client.post(self.url("/auth/refresh")).send().await?;
        Self::session_from(response, "Failed to refresh token").await
    }

    async fn logout(&self) -> Result<()> {
        let response = self.client.post(self.url("/auth/logout")).send().await?;
        Self::check(response, "Logout failed").await?;
        Ok(())
    }

    async fn register(&self, request: &RegisterRequest) -> Result<String> {
        let response = self.post_json("/auth/register", request).await?;
        Self::message_from(response, "Registration failed", REGISTERED_MESSAGE).await
    }

    async fn verify_email(&self, token: &str) -> Result<EmailVerificationResponse> {
        let url = self.segment_url("/auth/verify-email", token)?;
        let response = self.client.get(url).send().await?;
        let response = Self::check(response, "Verification failed").await?;

        response
            .json()
            .await
            .map_err(|e| AuthError::Parse(format!("verification payload: {}", e)))
    }

    async fn forgot_password(&self, email: &str) -> Result<String> {
        let body = ForgotPasswordRequest { email };
        let response = self.post_json("/auth/forgot-password", &body).await?;
        Self::message_from(response, "Failed to send reset email", RESET_REQUESTED_MESSAGE).await
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<String> {
        let body = ResetPasswordRequest {
            token,
            new_password,
        };
        let response = self.post_json("/auth/reset-password", &body).await?;
        Self::message_from(response, "Failed to reset password", PASSWORD_RESET_MESSAGE).await
    }
}
