use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::Duration;
use reqwest::{Client, Method, StatusCode};
use tokio::sync::watch;
use uuid::Uuid;

use super::backend::{AuthBackend, HttpAuthBackend};
use super::google::GoogleTokenSource;
use super::refresh::RefreshCoordinator;
use super::scheduler::{refresh_interval, RefreshScheduler};
use super::state::SessionStore;
use super::turnstile::BotVerification;
use super::types::{Credential, SessionState};
use super::validation::{validate_new_password, Registration};
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::http_client::{build_http_client, AuthedClient, SessionCookies};
use crate::models::api::{ProfileUpdateResponse, SessionResponse};
use crate::models::{ProfileUpdate, User};

/// Session manager
///
/// Owns one user session: the credential store, the refresh coordinator,
/// the authenticated client and the proactive refresh timer. Every login
/// flow ends in `set_session`; logout and failed renewals end in
/// `clear_session`.
///
/// Must be created inside a tokio runtime (the refresh timer is spawned
/// immediately and stops when the manager is dropped).
pub struct SessionManager {
    /// Correlates log lines of one session
    id: Uuid,

    /// Credential store and state publication
    store: Arc<SessionStore>,

    /// Auth endpoints
    backend: Arc<dyn AuthBackend>,

    /// Single-flight renewal
    refresher: RefreshCoordinator,

    /// Client for credentialed API calls
    client: AuthedClient,

    /// Proactive refresh timer
    scheduler: RefreshScheduler,

    /// Cookie jar to save on exit, when built from config
    cookies: Option<SessionCookies>,
}

impl SessionManager {
    /// Create a manager talking HTTP to the configured API
    ///
    /// With a cookie file configured, the jar saved by an earlier run is
    /// loaded, so `initialize` can resume that run's session.
    pub fn from_config(config: &Config) -> AnyResult<Self> {
        let cookies = match &config.cookie_file {
            Some(path) => SessionCookies::load(path)?,
            None => SessionCookies::in_memory(),
        };
        let client = build_http_client(
            config.http_max_connections,
            config.http_connect_timeout,
            config.http_request_timeout,
            &cookies,
        )?;
        let backend = Arc::new(HttpAuthBackend::new(client.clone(), config.api_url.as_str()));

        let mut manager = Self::with_backend(
            backend,
            client,
            &config.api_url,
            config.access_token_expire_minutes,
        );
        manager.cookies = Some(cookies);
        Ok(manager)
    }

    /// Create a manager over any backend
    ///
    /// `client` serves credentialed API calls under `api_base`;
    /// `expire_minutes` is the server's access-token lifetime.
    pub fn with_backend(
        backend: Arc<dyn AuthBackend>,
        client: Client,
        api_base: &str,
        expire_minutes: u64,
    ) -> Self {
        let id = Uuid::new_v4();
        let lifetime = Duration::minutes(i64::from(u32::try_from(expire_minutes).unwrap_or(u32::MAX)));
        let store = Arc::new(SessionStore::new(lifetime));
        let refresher = RefreshCoordinator::new(backend.clone(), store.clone());
        let client = AuthedClient::new(client, api_base, store.clone(), refresher.clone());
        let scheduler = RefreshScheduler::spawn(
            refresher.clone(),
            store.subscribe(),
            refresh_interval(expire_minutes),
        );

        tracing::debug!(session_id = %id, api_base = %api_base, "Session manager created");

        Self {
            id,
            store,
            backend,
            refresher,
            client,
            scheduler,
            cookies: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of `{user, credential, loading, error}`
    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    pub fn user(&self) -> Option<User> {
        self.store.user()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.store.credential()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.store.state().error().map(str::to_string)
    }

    /// Receiver notified on every session transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    /// Client for credentialed API calls
    pub fn client(&self) -> &AuthedClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Resolve the initial loading state
    ///
    /// One session check; if it fails, one renewal attempt. Returns whether
    /// a session was established. A visitor who never had a session ends up
    /// anonymous without an error message.
    pub async fn initialize(&self) -> bool {
        let credential = self.store.credential();

        match self.backend.check_session(credential.as_ref()).await {
            Ok(session) => {
                self.establish(session, "session");
                true
            }
            Err(e) => {
                tracing::debug!(session_id = %self.id, "No active session ({}), trying refresh", e);

                if self.refresher.refresh().await {
                    true
                } else {
                    self.store.clear_session(None);
                    false
                }
            }
        }
    }

    /// Email/password login
    ///
    /// Consumes the bot-verification token whatever the outcome.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        verification: &mut BotVerification,
    ) -> Result<User> {
        let token = verification.take()?;

        let session = self
            .backend
            .password_login(email.trim(), password, token.as_str())
            .await?;
        Ok(self.establish(session, "password"))
    }

    /// Exchange a Google access token for a session
    pub async fn login_with_google(&self, provider_token: &str) -> Result<User> {
        let session = self.backend.google_login(provider_token).await?;
        Ok(self.establish(session, "google"))
    }

    /// Await the provider's token, then exchange it
    pub async fn login_with_google_via(&self, mut source: impl GoogleTokenSource) -> Result<User> {
        let provider_token = source.access_token().await.map_err(|e| {
            tracing::warn!(session_id = %self.id, "Google provider flow failed: {}", e);
            e
        })?;
        self.login_with_google(&provider_token).await
    }

    /// Ask the server to email a sign-in link; the session is not touched
    pub async fn request_magic_link(
        &self,
        email: &str,
        verification: &mut BotVerification,
    ) -> Result<()> {
        let token = verification.take()?;

        self.backend
            .request_magic_link(email.trim(), token.as_str())
            .await?;
        tracing::info!(session_id = %self.id, "Magic link requested");
        Ok(())
    }

    /// Exchange a magic-link token for a session
    pub async fn verify_magic_link(&self, link_token: &str) -> Result<User> {
        if link_token.trim().is_empty() {
            return Err(AuthError::MissingLinkToken);
        }

        let session = self.backend.verify_magic_link(link_token.trim()).await?;
        Ok(self.establish(session, "magic_link"))
    }

    /// Confirm an email address
    ///
    /// Returns the signed-in user when the server sent a session with the
    /// confirmation, `None` when the visitor still has to log in.
    pub async fn verify_email(&self, email_token: &str) -> Result<Option<User>> {
        if email_token.trim().is_empty() {
            return Err(AuthError::MissingEmailToken);
        }

        let verification = self.backend.verify_email(email_token.trim()).await?;
        match verification.into_session() {
            Some(session) => Ok(Some(self.establish(session, "email_verification"))),
            None => {
                tracing::info!(session_id = %self.id, "Email verified without a session");
                Ok(None)
            }
        }
    }

    /// Create an account; never signs in
    ///
    /// Returns the server's confirmation message. Any current session is
    /// cleared since the visitor is expected to verify and log in. A form
    /// rejected by client-side validation keeps its bot-verification token.
    pub async fn register(
        &self,
        registration: Registration,
        verification: &mut BotVerification,
    ) -> Result<String> {
        registration.validate()?;
        let token = verification.take()?;

        let request = registration.into_request(token);
        let message = self.backend.register(&request).await?;

        tracing::info!(session_id = %self.id, "Account registered");
        self.store.clear_session(None);
        Ok(message)
    }

    /// Ask the server to email a password-reset link; the session is not touched
    ///
    /// The endpoint takes only the address, but the form still has to pass
    /// bot verification, and each request uses up the token.
    pub async fn forgot_password(
        &self,
        email: &str,
        verification: &mut BotVerification,
    ) -> Result<String> {
        verification.take()?;

        let message = self.backend.forgot_password(email.trim()).await?;
        tracing::info!(session_id = %self.id, "Password reset requested");
        Ok(message)
    }

    /// Set a new password with the token from the reset email
    ///
    /// Checks run in the form's order: reset token, bot verification, then
    /// the password pair. Only a submission that passes them all uses up
    /// the bot-verification token.
    pub async fn reset_password(
        &self,
        reset_token: Option<&str>,
        new_password: &str,
        confirmation: &str,
        verification: &mut BotVerification,
    ) -> Result<String> {
        let reset_token = reset_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingResetToken)?;
        if !verification.is_ready() {
            return Err(AuthError::MissingVerification);
        }
        validate_new_password(new_password, confirmation)?;
        verification.take()?;

        let message = self
            .backend
            .reset_password(reset_token, new_password)
            .await?;
        tracing::info!(session_id = %self.id, "Password reset");
        Ok(message)
    }

    /// `PUT /user/profile` with the session credential
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User> {
        if self.store.credential().is_none() {
            return Err(AuthError::NotAuthenticated);
        }

        let request = self
            .client
            .request(Method::PUT, "/user/profile")
            .json(&update)
            .build()?;
        let response = self.client.fetch_with_auth(request).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::SessionExpired);
        }
        if !status.is_success() {
            let body = response.bytes().await?;
            return Err(AuthError::from_response(
                status.as_u16(),
                &body,
                "Failed to update profile",
            ));
        }

        let profile: ProfileUpdateResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Parse(format!("profile payload: {}", e)))?;

        match profile.access_token.as_deref().filter(|t| !t.is_empty()) {
            // Username changes re-issue the token
            Some(access_token) => {
                let mut user = self.store.user().ok_or(AuthError::NotAuthenticated)?;
                profile.apply_to(&mut user);
                self.store.set_session(access_token, user.clone());
                Ok(user)
            }
            None => {
                if !self.store.update_user(|user| profile.apply_to(user)) {
                    return Err(AuthError::NotAuthenticated);
                }
                self.store.user().ok_or(AuthError::NotAuthenticated)
            }
        }
    }

    /// Best-effort server logout, then clear the session regardless
    pub async fn logout(&self) {
        if let Err(e) = self.backend.logout().await {
            tracing::warn!(session_id = %self.id, "Logout request failed: {}", e);
        }
        self.store.clear_session(None);
    }

    /// Store a credential obtained elsewhere
    pub fn set_session(&self, access_token: impl Into<String>, user: User) -> Credential {
        self.store.set_session(access_token, user)
    }

    /// Renew the credential now (joins a renewal already in flight)
    pub async fn refresh_access_token(&self) -> bool {
        self.refresher.refresh().await
    }

    /// Whether the proactive refresh timer is counting down
    pub fn refresh_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Write the cookie jar to its file so the next run can resume
    pub fn save_cookies(&self) -> AnyResult<()> {
        match &self.cookies {
            Some(cookies) => cookies.save(),
            None => Ok(()),
        }
    }

    /// Stop the proactive refresh timer
    pub fn shutdown(&self) {
        tracing::debug!(session_id = %self.id, "Stopping refresh scheduler");
        self.scheduler.stop();
    }

    fn establish(&self, session: SessionResponse, method: &str) -> User {
        let user = session.user.clone();
        self.store.set_session(session.access_token, session.user);

        tracing::info!(
            session_id = %self.id,
            method = method,
            user = %user.display_name(),
            "Logged in"
        );
        user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::google::oauth_callback;
    use crate::auth::testing::{test_user, FakeBackend, PASSWORD};
    use crate::models::SubscriptionTier;
    use tokio_test::{assert_err, assert_ok};

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn verified(token: &str) -> BotVerification {
        BotVerification::with_token(token)
    }

    fn manager(backend: &Arc<FakeBackend>) -> SessionManager {
        SessionManager::with_backend(backend.clone(), Client::new(), "http://localhost:8000", 30)
    }

    #[tokio::test]
    async fn test_initial_state_is_loading() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);

        assert!(manager.is_loading());
        assert!(manager.user().is_none());
        assert!(manager.credential().is_none());
    }

    #[tokio::test]
    async fn test_initialize_with_active_session() {
        let backend = Arc::new(FakeBackend::new().with_session("cookie-token"));
        let manager = manager(&backend);

        assert!(manager.initialize().await);

        let state = manager.state();
        assert!(!state.is_loading());
        assert_eq!(state.credential().map(|c| c.token()), Some("cookie-token"));
        assert_eq!(backend.session_calls(), 1);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_initialize_falls_back_to_refresh() {
        let backend = Arc::new(FakeBackend::new().with_refresh(true));
        let manager = manager(&backend);

        assert!(manager.initialize().await);

        assert_eq!(
            manager.credential().map(|c| c.token().to_string()),
            Some("renewed-1".to_string())
        );
        assert_eq!(backend.session_calls(), 1);
        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_initialize_anonymous_has_no_error() {
        let backend = Arc::new(FakeBackend::new().with_refresh(false));
        let manager = manager(&backend);

        assert!(!manager.initialize().await);

        let state = manager.state();
        assert!(!state.is_loading());
        assert!(state.user().is_none());
        assert!(state.error().is_none());
        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_password_login() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);

        let user = assert_ok!(
            manager
                .login(" analyst@example.com ", PASSWORD, &mut verified("tt-1"))
                .await
        );

        assert_eq!(user.email, "analyst@example.com");
        assert_eq!(
            manager.credential().map(|c| c.token().to_string()),
            Some("login-token".to_string())
        );
        assert!(!manager.is_loading());
        settle().await;
        assert!(manager.refresh_armed());
    }

    #[tokio::test]
    async fn test_failed_login_leaves_state() {
        let backend = Arc::new(FakeBackend::new().with_refresh(false));
        let manager = manager(&backend);
        manager.initialize().await;

        let err = assert_err!(
            manager
                .login("analyst@example.com", "wrong", &mut verified("tt-1"))
                .await
        );

        assert_eq!(err.to_string(), "Incorrect email or password");
        assert!(manager.user().is_none());
        assert!(manager.error().is_none());
    }

    #[tokio::test]
    async fn test_blank_bot_token_makes_no_call() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);

        let err = manager
            .login("analyst@example.com", PASSWORD, &mut verified(""))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingVerification));

        let err = manager
            .request_magic_link("analyst@example.com", &mut verified("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingVerification));

        assert_eq!(backend.login_calls(), 0);
        assert_eq!(backend.magic_link_calls(), 0);
    }

    #[tokio::test]
    async fn test_bot_token_is_single_use() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);
        let mut verification = verified("tt-1");

        let err = assert_err!(
            manager
                .login("analyst@example.com", "wrong", &mut verification)
                .await
        );
        assert_eq!(err.to_string(), "Incorrect email or password");

        // Resubmitting without a new widget token never reaches the server
        let err = assert_err!(
            manager
                .login("analyst@example.com", PASSWORD, &mut verification)
                .await
        );
        assert!(matches!(err, AuthError::MissingVerification));
        assert_eq!(backend.login_calls(), 1);
        assert_eq!(verification.generation(), 1);

        verification.provide("tt-2");
        assert_ok!(
            manager
                .login("analyst@example.com", PASSWORD, &mut verification)
                .await
        );
        assert_eq!(backend.login_calls(), 2);
    }

    #[tokio::test]
    async fn test_google_login_via_callback() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);
        let (callback, pending) = oauth_callback();

        tokio::spawn(async move {
            callback.resolve("google-ok");
        });

        let user = manager.login_with_google_via(pending).await.unwrap();
        assert_eq!(user.subscription_tier, SubscriptionTier::Pro);
        assert_eq!(
            manager.credential().map(|c| c.token().to_string()),
            Some("google-token".to_string())
        );
        assert_eq!(backend.google_calls(), 1);
    }

    #[tokio::test]
    async fn test_google_provider_failure_makes_no_call() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);
        let (callback, pending) = oauth_callback();
        callback.reject("popup_closed");

        let err = manager.login_with_google_via(pending).await.unwrap_err();
        assert!(matches!(err, AuthError::OAuth(_)));
        assert_eq!(backend.google_calls(), 0);
        assert!(manager.credential().is_none());
    }

    #[tokio::test]
    async fn test_google_exchange_rejected() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);

        let err = manager.login_with_google("forged").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid Google token");
        assert!(manager.credential().is_none());
    }

    #[tokio::test]
    async fn test_magic_link_request_keeps_session() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);
        manager.set_session("existing", test_user(SubscriptionTier::Free));

        assert_ok!(
            manager
                .request_magic_link("analyst@example.com", &mut verified("tt-1"))
                .await
        );
        assert_eq!(backend.magic_link_calls(), 1);
        assert_eq!(
            manager.credential().map(|c| c.token().to_string()),
            Some("existing".to_string())
        );
    }

    #[tokio::test]
    async fn test_verify_magic_link_empty_token() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);

        let err = manager.verify_magic_link(" ").await.unwrap_err();
        assert_eq!(err.to_string(), "No verification token found");
        assert_eq!(backend.verify_calls(), 0);
    }

    #[tokio::test]
    async fn test_register_validates_before_network() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);
        let mut verification = verified("tt-1");

        let err = manager
            .register(Registration::new("new@example.com", "weak"), &mut verification)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(err.field_message("password").is_some());
        assert_eq!(backend.register_calls(), 0);
        assert!(verification.is_ready());
    }

    #[tokio::test]
    async fn test_register_clears_session() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);
        manager.set_session("existing", test_user(SubscriptionTier::Free));

        let registration = Registration::new("new@example.com", "Secret123")
            .username("new_analyst")
            .first_name("");
        let message = manager
            .register(registration, &mut verified("tt-9"))
            .await
            .unwrap();

        assert_eq!(message, "Check your inbox");
        assert!(manager.credential().is_none());
        assert!(manager.error().is_none());

        let sent = backend.last_register().unwrap();
        assert_eq!(sent.turnstile_token, "tt-9");
        assert_eq!(sent.username.as_deref(), Some("new_analyst"));
        assert_eq!(sent.first_name, None);
    }

    #[tokio::test]
    async fn test_verify_email_signs_in() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);

        let user = assert_ok!(manager.verify_email(" good-email ").await);
        assert_eq!(user.map(|u| u.email), Some("analyst@example.com".to_string()));
        assert_eq!(
            manager.credential().map(|c| c.token().to_string()),
            Some("email-token".to_string())
        );
        settle().await;
        assert!(manager.refresh_armed());
    }

    #[tokio::test]
    async fn test_verify_email_without_session() {
        let backend = Arc::new(FakeBackend::new().with_refresh(false));
        let manager = manager(&backend);
        manager.initialize().await;

        assert_eq!(assert_ok!(manager.verify_email("verified-only").await), None);
        assert!(manager.credential().is_none());

        let err = assert_err!(manager.verify_email("").await);
        assert!(matches!(err, AuthError::MissingEmailToken));
        assert_eq!(backend.email_calls(), 1);
    }

    #[tokio::test]
    async fn test_forgot_password_uses_bot_token() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);
        let mut verification = verified("tt-1");

        let message = assert_ok!(
            manager
                .forgot_password("analyst@example.com", &mut verification)
                .await
        );
        assert_eq!(message, "Reset email sent");

        let err = assert_err!(
            manager
                .forgot_password("analyst@example.com", &mut verification)
                .await
        );
        assert!(matches!(err, AuthError::MissingVerification));
        assert_eq!(backend.reset_calls(), 1);
    }

    #[tokio::test]
    async fn test_reset_password_checks_in_form_order() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);

        let err = assert_err!(
            manager
                .reset_password(None, "Secret456", "Secret456", &mut verified("tt-1"))
                .await
        );
        assert_eq!(err.to_string(), "Invalid or missing reset token");

        let err = assert_err!(
            manager
                .reset_password(Some("reset-ok"), "Secret456", "Secret456", &mut verified(""))
                .await
        );
        assert!(matches!(err, AuthError::MissingVerification));

        let mut verification = verified("tt-1");
        let err = assert_err!(
            manager
                .reset_password(Some("reset-ok"), "Secret456", "Secret457", &mut verification)
                .await
        );
        assert_eq!(err.field_message("confirm_password"), Some("Passwords do not match"));
        assert!(verification.is_ready());
        assert_eq!(backend.reset_calls(), 0);

        let message = assert_ok!(
            manager
                .reset_password(Some("reset-ok"), "Secret456", "Secret456", &mut verification)
                .await
        );
        assert_eq!(message, "Password reset successfully");
        assert!(!verification.is_ready());
        assert!(manager.credential().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_even_on_failure() {
        let backend = Arc::new(FakeBackend::new().with_failing_logout());
        let manager = manager(&backend);
        manager.set_session("token", test_user(SubscriptionTier::Pro));

        manager.logout().await;

        let state = manager.state();
        assert!(state.user().is_none());
        assert!(state.error().is_none());
        assert_eq!(backend.logout_calls(), 1);
        settle().await;
        assert!(!manager.refresh_armed());
    }

    #[tokio::test]
    async fn test_update_profile_requires_session() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);

        let err = manager
            .update_profile(ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_update_profile_merges_and_adopts_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/user/profile")
            .match_header("authorization", "Bearer token-1")
            .match_body(mockito::Matcher::Json(serde_json::json!({ "username": "renamed" })))
            .with_status(200)
            .with_body(
                r#"{"email":"analyst@example.com","username":"renamed","profile_picture_url":"https://cdn/p.png","access_token":"token-2"}"#,
            )
            .create_async()
            .await;

        let backend = Arc::new(FakeBackend::new());
        let manager =
            SessionManager::with_backend(backend.clone(), Client::new(), &server.url(), 30);
        manager.set_session("token-1", test_user(SubscriptionTier::Pro));

        let user = manager
            .update_profile(ProfileUpdate {
                username: Some("renamed".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(user.username.as_deref(), Some("renamed"));
        assert_eq!(user.image.as_deref(), Some("https://cdn/p.png"));
        assert_eq!(user.first_name.as_deref(), Some("Ada"));
        assert_eq!(
            manager.credential().map(|c| c.token().to_string()),
            Some("token-2".to_string())
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_profile_field_error_keeps_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/user/profile")
            .with_status(400)
            .with_body(r#"{"detail":[{"loc":["body","username"],"msg":"Username already taken"}]}"#)
            .create_async()
            .await;

        let backend = Arc::new(FakeBackend::new());
        let manager =
            SessionManager::with_backend(backend.clone(), Client::new(), &server.url(), 30);
        manager.set_session("token-1", test_user(SubscriptionTier::Pro));

        let err = manager
            .update_profile(ProfileUpdate {
                username: Some("taken".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.field_message("username"), Some("Username already taken"));
        assert!(manager.credential().is_some());
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_access_token() {
        let backend = Arc::new(FakeBackend::new().with_refresh(true));
        let manager = manager(&backend);

        assert!(manager.refresh_access_token().await);
        backend.set_refresh(false);
        assert!(!manager.refresh_access_token().await);

        assert_eq!(
            manager.error().as_deref(),
            Some(crate::error::SESSION_EXPIRED_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_scheduler() {
        let backend = Arc::new(FakeBackend::new());
        let manager = manager(&backend);
        manager.set_session("token", test_user(SubscriptionTier::Free));
        settle().await;
        assert!(manager.refresh_armed());

        manager.shutdown();
        assert!(!manager.refresh_armed());
    }
}
