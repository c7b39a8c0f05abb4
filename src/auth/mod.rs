// Authentication module
// Manages the session credential lifecycle and the login flows

mod backend;
mod email_verification;
mod google;
mod magic_link;
mod manager;
mod refresh;
mod scheduler;
mod state;
mod turnstile;
mod types;
mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    AuthBackend, HttpAuthBackend, PASSWORD_RESET_MESSAGE, REGISTERED_MESSAGE,
    RESET_REQUESTED_MESSAGE,
};
pub use email_verification::{
    EmailVerificationOutcome, EmailVerifier, LOGIN_REDIRECT, REGISTER_REDIRECT,
    SIGNED_IN_REDIRECT,
};
pub use google::{oauth_callback, GoogleTokenSource, OAuthCallback, PendingOAuth};
pub use magic_link::{MagicLinkOutcome, MagicLinkVerifier, RETRY_REDIRECT, VERIFIED_REDIRECT};
pub use manager::SessionManager;
pub use refresh::RefreshCoordinator;
pub use scheduler::{refresh_interval, RefreshScheduler};
pub use state::SessionStore;
pub use turnstile::{BotToken, BotVerification};
pub use types::{Credential, SessionState};
pub use validation::{validate_new_password, Registration};
