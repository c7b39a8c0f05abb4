// Credential store and session state publication

use chrono::Duration;
use tokio::sync::watch;

use super::types::{Credential, SessionState};
use crate::models::User;

/// Per-session credential store
///
/// Holds the current credential and publishes every transition through a
/// watch channel. The whole state is replaced in one step, so readers never
/// see a user without its credential or the reverse.
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
    token_lifetime: Duration,
}

impl SessionStore {
    /// Create a store in the loading state
    pub fn new(token_lifetime: Duration) -> Self {
        let (tx, _rx) = watch::channel(SessionState::loading());
        Self { tx, token_lifetime }
    }

    /// Lifetime the server gives each access token
    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Current credential, read fresh on every call
    pub fn credential(&self) -> Option<Credential> {
        self.tx.borrow().credential().cloned()
    }

    pub fn user(&self) -> Option<User> {
        self.tx.borrow().user().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().is_loading()
    }

    /// Receiver notified on every state transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Store a freshly issued token together with its user
    pub fn set_session(&self, access_token: impl Into<String>, user: User) -> Credential {
        let credential = Credential::issue(access_token, self.token_lifetime);

        tracing::info!(
            email = %user.email,
            tier = %user.subscription_tier,
            expires_at = %credential.expires_at().to_rfc3339(),
            "Session established"
        );

        self.tx
            .send_replace(SessionState::authenticated(user, credential.clone()));
        credential
    }

    /// Drop the credential and user, publishing an optional message
    pub fn clear_session(&self, error: Option<String>) {
        match &error {
            Some(message) => tracing::warn!(reason = %message, "Session cleared"),
            None => tracing::info!("Session cleared"),
        }

        self.tx.send_replace(SessionState::anonymous(error));
    }

    /// Apply an in-place change to the cached user
    ///
    /// Returns `false` (and publishes nothing) when no one is signed in.
    pub fn update_user(&self, update: impl FnOnce(&mut User)) -> bool {
        self.tx.send_if_modified(|state| match state.user_mut() {
            Some(user) => {
                update(user);
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriptionTier;

    fn user(email: &str) -> User {
        User {
            email: email.to_string(),
            username: None,
            first_name: None,
            last_name: None,
            image: None,
            subscription_tier: SubscriptionTier::Free,
        }
    }

    fn assert_paired(state: &SessionState) {
        assert_eq!(state.user().is_some(), state.credential().is_some());
    }

    #[test]
    fn test_new_store_is_loading() {
        let store = SessionStore::new(Duration::minutes(30));
        let state = store.state();
        assert!(state.is_loading());
        assert!(store.credential().is_none());
        assert_paired(&state);
    }

    #[test]
    fn test_set_and_clear_session() {
        let store = SessionStore::new(Duration::minutes(30));

        let credential = store.set_session("token-1", user("a@example.com"));
        let state = store.state();
        assert_eq!(credential.token(), "token-1");
        assert_eq!(state.credential().map(Credential::token), Some("token-1"));
        assert_eq!(state.user().map(|u| u.email.as_str()), Some("a@example.com"));
        assert!(!state.is_loading());
        assert!(state.error().is_none());
        assert_paired(&state);

        store.clear_session(Some("Session expired. Please log in again.".to_string()));
        let state = store.state();
        assert!(store.credential().is_none());
        assert!(!state.is_loading());
        assert_eq!(state.error(), Some("Session expired. Please log in again."));
        assert_paired(&state);
    }

    #[test]
    fn test_credential_lifetime_follows_store() {
        let store = SessionStore::new(Duration::minutes(5));
        let credential = store.set_session("t", user("a@example.com"));
        assert_eq!(
            credential.expires_at() - credential.issued_at(),
            Duration::minutes(5)
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let store = SessionStore::new(Duration::minutes(30));
        let mut rx = store.subscribe();

        store.set_session("token-1", user("a@example.com"));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_authenticated());

        store.clear_session(None);
        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert!(!state.is_authenticated());
        assert_paired(&state);
    }

    #[test]
    fn test_update_user_requires_session() {
        let store = SessionStore::new(Duration::minutes(30));
        assert!(!store.update_user(|u| u.first_name = Some("Ada".to_string())));

        store.set_session("token-1", user("a@example.com"));
        assert!(store.update_user(|u| u.first_name = Some("Ada".to_string())));
        assert_eq!(
            store.user().and_then(|u| u.first_name),
            Some("Ada".to_string())
        );
        assert_eq!(store.credential().map(|c| c.token().to_string()), Some("token-1".to_string()));
    }
}
