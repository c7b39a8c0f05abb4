// Google OAuth token acquisition
// The provider SDK hands its result to a callback; this turns it into a future

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{AuthError, Result};

/// Source of a Google access token for `POST /auth/google`
#[async_trait]
pub trait GoogleTokenSource: Send {
    async fn access_token(&mut self) -> Result<String>;
}

/// A token obtained out of band (CLI flag, test fixture)
#[async_trait]
impl GoogleTokenSource for String {
    async fn access_token(&mut self) -> Result<String> {
        if self.trim().is_empty() {
            return Err(AuthError::OAuth("empty provider token".to_string()));
        }
        Ok(self.clone())
    }
}

/// Create a linked callback/future pair for a callback-style provider
///
/// Hand the `OAuthCallback` to the provider and await the `PendingOAuth`.
pub fn oauth_callback() -> (OAuthCallback, PendingOAuth) {
    let (tx, rx) = oneshot::channel();
    (OAuthCallback { tx }, PendingOAuth { rx: Some(rx) })
}

/// Provider-facing half: resolved exactly once
#[derive(Debug)]
pub struct OAuthCallback {
    tx: oneshot::Sender<Result<String>>,
}

impl OAuthCallback {
    /// Provider returned an access token
    pub fn resolve(self, access_token: impl Into<String>) {
        let _ = self.tx.send(Ok(access_token.into()));
    }

    /// Provider reported an error (popup closed, consent denied, ...)
    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(AuthError::OAuth(reason.into())));
    }
}

/// Awaiting half of `oauth_callback`
#[derive(Debug)]
pub struct PendingOAuth {
    rx: Option<oneshot::Receiver<Result<String>>>,
}

#[async_trait]
impl GoogleTokenSource for PendingOAuth {
    async fn access_token(&mut self) -> Result<String> {
        let rx = self
            .rx
            .take()
            .ok_or_else(|| AuthError::OAuth("provider result already consumed".to_string()))?;

        match rx.await {
            Ok(result) => result,
            // Callback dropped without an answer
            Err(_) => Err(AuthError::OAuth("Google sign-in was cancelled".to_string())),
        }
    }
}
