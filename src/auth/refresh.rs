// Token refresh logic
// Single-flight renewal shared by the scheduler and the 401 retry path

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use super::backend::AuthBackend;
use super::state::SessionStore;
use crate::error::SESSION_EXPIRED_MESSAGE;

type PendingRefresh = Shared<BoxFuture<'static, bool>>;

/// Renews the access credential at most once per need
///
/// While a renewal is in flight every further caller awaits the same
/// result. Two concurrent 401s therefore produce one `/auth/refresh` call,
/// which matters when the server rotates the refresh cookie on each use.
#[derive(Clone)]
pub struct RefreshCoordinator {
    backend: Arc<dyn AuthBackend>,
    store: Arc<SessionStore>,
    in_flight: Arc<Mutex<Option<PendingRefresh>>>,
}

impl RefreshCoordinator {
    pub fn new(backend: Arc<dyn AuthBackend>, store: Arc<SessionStore>) -> Self {
        Self {
            backend,
            store,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Renew the credential, joining a renewal already in flight
    ///
    /// Returns `true` when a new credential was stored. On failure the
    /// session is cleared with the "session expired" message.
    pub async fn refresh(&self) -> bool {
        let pending = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let pending = renew(
                        self.backend.clone(),
                        self.store.clone(),
                        self.in_flight.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Whether a renewal is currently in flight
    pub async fn is_refreshing(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }
}

/// One renewal round trip; empties the in-flight slot when done
async fn renew(
    backend: Arc<dyn AuthBackend>,
    store: Arc<SessionStore>,
    slot: Arc<Mutex<Option<PendingRefresh>>>,
) -> bool {
    tracing::debug!("Refreshing access token...");

    let renewed = match backend.refresh().await {
        Ok(session) => {
            let credential = store.set_session(session.access_token, session.user);
            tracing::info!(
                "Token refreshed, expires: {}",
                credential.expires_at().to_rfc3339()
            );
            true
        }
        Err(e) => {
            tracing::error!("Token refresh failed: {}", e);
            store.clear_session(Some(SESSION_EXPIRED_MESSAGE.to_string()));
            false
        }
    };

    slot.lock().await.take();
    renewed
}
