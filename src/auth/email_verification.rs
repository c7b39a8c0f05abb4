// Email-verification page

use std::sync::atomic::{AtomicBool, Ordering};

use super::manager::SessionManager;
use crate::error::AuthError;

/// Where a visitor signed in by the verification continues
pub const SIGNED_IN_REDIRECT: &str = "/dashboard";

/// Where a verified visitor without a session logs in
pub const LOGIN_REDIRECT: &str = "/login";

/// Second way out of a failed verification
pub const REGISTER_REDIRECT: &str = "/register";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailVerificationOutcome {
    /// Address confirmed and session established
    SignedIn { redirect_to: &'static str },
    /// Address confirmed, but the server sent no session
    Verified {
        message: String,
        redirect_to: &'static str,
    },
    /// This page already ran its verification; nothing was sent
    AlreadyAttempted,
    /// Show `message` with links to log in or register again
    Failed {
        message: String,
        login_to: &'static str,
        register_to: &'static str,
    },
}

impl EmailVerificationOutcome {
    fn failed(message: String) -> Self {
        EmailVerificationOutcome::Failed {
            message,
            login_to: LOGIN_REDIRECT,
            register_to: REGISTER_REDIRECT,
        }
    }
}

/// One per page instance, same at-most-once rule as magic links
#[derive(Debug, Default)]
pub struct EmailVerifier {
    attempted: AtomicBool,
}

impl EmailVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attempted(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
    }

    pub async fn verify(
        &self,
        manager: &SessionManager,
        token: Option<&str>,
    ) -> EmailVerificationOutcome {
        if self.attempted.swap(true, Ordering::SeqCst) {
            tracing::debug!("Email verification already attempted, skipping");
            return EmailVerificationOutcome::AlreadyAttempted;
        }

        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return EmailVerificationOutcome::failed(AuthError::MissingEmailToken.to_string());
        };

        match manager.verify_email(token).await {
            Ok(Some(_)) => EmailVerificationOutcome::SignedIn {
                redirect_to: SIGNED_IN_REDIRECT,
            },
            Ok(None) => EmailVerificationOutcome::Verified {
                message: "Email verified successfully! Please log in.".to_string(),
                redirect_to: LOGIN_REDIRECT,
            },
            Err(e) => EmailVerificationOutcome::failed(e.to_string()),
        }
    }
}
