// Session types

use chrono::{DateTime, Duration, Utc};

use crate::models::User;

/// Short-lived bearer credential
///
/// Held in memory only. `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Wrap a freshly issued token whose server-side lifetime is `lifetime`
    pub fn issue(token: impl Into<String>, lifetime: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            token: token.into(),
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Same token, regardless of when it was wrapped
    pub fn same_token(&self, other: &Credential) -> bool {
        self.token == other.token
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at.to_rfc3339())
            .finish()
    }
}

/// User and credential, always held together
#[derive(Debug, Clone, PartialEq, Eq)]
struct Authenticated {
    user: User,
    credential: Credential,
}

/// Observable session state: `{user, credential, loading, error}`
///
/// User and credential live in one slot, so one is present exactly when the
/// other is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    session: Option<Authenticated>,
    loading: bool,
    error: Option<String>,
}

impl SessionState {
    /// State at process start, before the initial session check resolves
    pub fn loading() -> Self {
        Self {
            session: None,
            loading: true,
            error: None,
        }
    }

    pub fn authenticated(user: User, credential: Credential) -> Self {
        Self {
            session: Some(Authenticated { user, credential }),
            loading: false,
            error: None,
        }
    }

    pub fn anonymous(error: Option<String>) -> Self {
        Self {
            session: None,
            loading: false,
            error,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.session.as_ref().map(|s| &s.credential)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn user_mut(&mut self) -> Option<&mut User> {
        self.session.as_mut().map(|s| &mut s.user)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::loading()
    }
}
