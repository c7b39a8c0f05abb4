// Magic-link verification page

use std::sync::atomic::{AtomicBool, Ordering};

use super::manager::SessionManager;
use crate::error::AuthError;

/// Where a verified visitor continues
pub const VERIFIED_REDIRECT: &str = "/dashboard";

/// Where the "try again" affordance points after a failure
pub const RETRY_REDIRECT: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicLinkOutcome {
    /// Session established
    Verified { redirect_to: &'static str },
    /// This page already ran its verification; nothing was sent
    AlreadyAttempted,
    /// Verification failed; show `message` with a link to `retry_to`
    Failed {
        message: String,
        retry_to: &'static str,
    },
}

/// One per page instance
///
/// The page may trigger verification several times (re-renders, repeated
/// effects); only the first trigger reaches the server, since the link
/// token is single-use. A failed attempt does not reopen the guard: the
/// visitor goes back through `/login` for a new link.
#[derive(Debug, Default)]
pub struct MagicLinkVerifier {
    attempted: AtomicBool,
}

impl MagicLinkVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attempted(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Verify `token` (the `?token=` query value) at most once
    pub async fn verify(&self, manager: &SessionManager, token: Option<&str>) -> MagicLinkOutcome {
        if self.attempted.swap(true, Ordering::SeqCst) {
            tracing::debug!("Magic link verification already attempted, skipping");
            return MagicLinkOutcome::AlreadyAttempted;
        }

        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return MagicLinkOutcome::Failed {
                message: AuthError::MissingLinkToken.to_string(),
                retry_to: RETRY_REDIRECT,
            };
        };

        match manager.verify_magic_link(token).await {
            Ok(_) => MagicLinkOutcome::Verified {
                redirect_to: VERIFIED_REDIRECT,
            },
            Err(e) => MagicLinkOutcome::Failed {
                message: e.to_string(),
                retry_to: RETRY_REDIRECT,
            },
        }
    }
}
