// In-memory backend for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::backend::AuthBackend;
use super::types::Credential;
use crate::error::{AuthError, Result};
use crate::models::api::{EmailVerificationResponse, RegisterRequest, SessionResponse};
use crate::models::{SubscriptionTier, User};

pub(crate) const PASSWORD: &str = "Secret123";

pub(crate) fn test_user(tier: SubscriptionTier) -> User {
    User {
        email: "analyst@example.com".to_string(),
        username: Some("analyst".to_string()),
        first_name: Some("Ada".to_string()),
        last_name: None,
        image: None,
        subscription_tier: tier,
    }
}

fn session(token: &str) -> SessionResponse {
    SessionResponse {
        access_token: token.to_string(),
        token_type: Some("bearer".to_string()),
        user: test_user(SubscriptionTier::Pro),
    }
}

fn rejected(status: u16, message: &str) -> AuthError {
    AuthError::Rejected {
        status,
        message: message.to_string(),
    }
}

/// Scripted `AuthBackend` with call counters
///
/// Refresh hands out `renewed-1`, `renewed-2`, ... while enabled. A held
/// refresh blocks until `release_refresh` is called.
#[derive(Default)]
pub(crate) struct FakeBackend {
    refresh_enabled: Mutex<bool>,
    session_token: Mutex<Option<String>>,
    logout_fails: Mutex<bool>,
    refresh_gate: Option<Arc<Semaphore>>,
    refresh_calls: AtomicUsize,
    session_calls: AtomicUsize,
    login_calls: AtomicUsize,
    google_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    register_calls: AtomicUsize,
    magic_link_calls: AtomicUsize,
    email_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    last_register: Mutex<Option<RegisterRequest>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_refresh(self, enabled: bool) -> Self {
        *self.refresh_enabled.lock().unwrap() = enabled;
        self
    }

    pub(crate) fn with_session(self, token: &str) -> Self {
        *self.session_token.lock().unwrap() = Some(token.to_string());
        self
    }

    pub(crate) fn with_failing_logout(self) -> Self {
        *self.logout_fails.lock().unwrap() = true;
        self
    }

    pub(crate) fn hold_refresh(mut self) -> Self {
        self.refresh_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub(crate) fn set_refresh(&self, enabled: bool) {
        *self.refresh_enabled.lock().unwrap() = enabled;
    }

    pub(crate) fn release_refresh(&self) {
        if let Some(gate) = &self.refresh_gate {
            gate.add_permits(64);
        }
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn google_calls(&self) -> usize {
        self.google_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn magic_link_calls(&self) -> usize {
        self.magic_link_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn email_calls(&self) -> usize {
        self.email_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_register(&self) -> Option<RegisterRequest> {
        self.last_register.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn password_login(
        &self,
        email: &str,
        password: &str,
        turnstile_token: &str,
    ) -> Result<SessionResponse> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if turnstile_token.is_empty() {
            return Err(rejected(400, "Invalid CAPTCHA"));
        }
        if email != "analyst@example.com" || password != PASSWORD {
            return Err(rejected(401, "Incorrect email or password"));
        }
        Ok(session("login-token"))
    }

    async fn google_login(&self, provider_token: &str) -> Result<SessionResponse> {
        self.google_calls.fetch_add(1, Ordering::SeqCst);
        if provider_token != "google-ok" {
            return Err(rejected(400, "Invalid Google token"));
        }
        Ok(session("google-token"))
    }

    async fn request_magic_link(&self, _email: &str, _turnstile_token: &str) -> Result<()> {
        self.magic_link_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn verify_magic_link(&self, token: &str) -> Result<SessionResponse> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if token != "good-link" {
            return Err(rejected(400, "Invalid or expired magic link"));
        }
        Ok(session("magic-token"))
    }

    async fn check_session(&self, _credential: Option<&Credential>) -> Result<SessionResponse> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        let token = self.session_token.lock().unwrap().clone();
        match token {
            Some(token) => Ok(session(&token)),
            None => Err(rejected(401, "Could not validate credentials")),
        }
    }

    async fn refresh(&self) -> Result<SessionResponse> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.refresh_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let enabled = *self.refresh_enabled.lock().unwrap();
        if enabled {
            Ok(session(&format!("renewed-{}", call)))
        } else {
            Err(rejected(401, "Invalid refresh token"))
        }
    }

    async fn logout(&self) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if *self.logout_fails.lock().unwrap() {
            return Err(rejected(500, "Logout failed"));
        }
        Ok(())
    }

    async fn register(&self, request: &RegisterRequest) -> Result<String> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_register.lock().unwrap() = Some(request.clone());
        Ok("Check your inbox".to_string())
    }

    async fn verify_email(&self, token: &str) -> Result<EmailVerificationResponse> {
        self.email_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match token {
            "good-email" => Ok(EmailVerificationResponse {
                message: Some("Email verified successfully".to_string()),
                access_token: Some("email-token".to_string()),
                token_type: Some("bearer".to_string()),
                user: Some(test_user(SubscriptionTier::Free)),
            }),
            "verified-only" => Ok(EmailVerificationResponse {
                message: Some("Email verified successfully".to_string()),
                ..Default::default()
            }),
            _ => Err(rejected(400, "Invalid token")),
        }
    }

    async fn forgot_password(&self, _email: &str) -> Result<String> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        Ok("Reset email sent".to_string())
    }

    async fn reset_password(&self, token: &str, _new_password: &str) -> Result<String> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        if token != "reset-ok" {
            return Err(rejected(400, "Invalid or expired token"));
        }
        Ok("Password reset successfully".to_string())
    }
}
