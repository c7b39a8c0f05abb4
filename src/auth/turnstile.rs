// Bot-verification (Turnstile) token handling

use crate::error::{AuthError, Result};

/// A single-use bot-verification token
///
/// Only `BotVerification::take` hands these out, and they are not `Clone`:
/// submitting a form consumes one.
#[derive(Debug, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    #[cfg(test)]
    pub(crate) fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Slot holding the widget's current token
///
/// `take` empties the slot, so after every submission the widget has to
/// produce a new token. `generation` bumps on each take and tells the view
/// to reset the widget.
#[derive(Debug, Default)]
pub struct BotVerification {
    token: Option<String>,
    generation: u64,
}

impl BotVerification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot already holding `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        let mut verification = Self::new();
        verification.provide(token);
        verification
    }

    /// Store a token handed over by the widget; blank tokens are ignored
    pub fn provide(&mut self, token: impl Into<String>) {
        let token = token.into();
        if token.trim().is_empty() {
            self.token = None;
        } else {
            self.token = Some(token);
        }
    }

    /// Take the token for one submission
    pub fn take(&mut self) -> Result<BotToken> {
        let token = self.token.take().ok_or(AuthError::MissingVerification)?;
        self.generation += 1;
        Ok(BotToken(token))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_ready(&self) -> bool {
        self.token.is_some()
    }
}
