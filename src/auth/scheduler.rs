// Proactive token refresh
// Renews the credential shortly before the server-side expiry

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::refresh::RefreshCoordinator;
use super::types::SessionState;

/// Renew this long before the token expires
const REFRESH_LEAD: Duration = Duration::from_secs(5 * 60);

/// Never tick faster than this, even with very short-lived tokens
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Tick period for a token lifetime of `expire_minutes`
///
/// `max(expire_minutes - 5, 0.5)` minutes.
pub fn refresh_interval(expire_minutes: u64) -> Duration {
    Duration::from_secs(expire_minutes.saturating_mul(60))
        .saturating_sub(REFRESH_LEAD)
        .max(MIN_REFRESH_INTERVAL)
}

/// Background task that refreshes the credential on a timer
///
/// Armed only while a credential exists. Each new credential gets a full
/// interval before its first tick. The task stops on drop.
pub struct RefreshScheduler {
    handle: JoinHandle<()>,
    armed: Arc<AtomicBool>,
}

impl RefreshScheduler {
    /// Spawn the scheduler on the current tokio runtime
    pub fn spawn(
        coordinator: RefreshCoordinator,
        sessions: watch::Receiver<SessionState>,
        interval: Duration,
    ) -> Self {
        let armed = Arc::new(AtomicBool::new(false));

        tracing::debug!(
            interval_secs = interval.as_secs(),
            "Starting proactive refresh scheduler"
        );
        let handle = tokio::spawn(run(coordinator, sessions, interval, armed.clone()));

        Self { handle, armed }
    }

    /// Whether a timer is currently counting down
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.handle.abort();
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    coordinator: RefreshCoordinator,
    mut sessions: watch::Receiver<SessionState>,
    interval: Duration,
    armed: Arc<AtomicBool>,
) {
    loop {
        let current = sessions.borrow_and_update().credential().cloned();

        let Some(credential) = current else {
            armed.store(false, Ordering::SeqCst);
            if sessions.changed().await.is_err() {
                break;
            }
            continue;
        };

        armed.store(true, Ordering::SeqCst);
        tracing::debug!(
            next_refresh_secs = interval.as_secs(),
            "Refresh timer armed"
        );

        let deadline = tokio::time::sleep(interval);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::debug!("Proactive refresh tick");
                    if !coordinator.refresh().await {
                        tracing::warn!("Proactive refresh failed, timer disarmed");
                    }
                    break;
                }
                changed = sessions.changed() => {
                    if changed.is_err() {
                        armed.store(false, Ordering::SeqCst);
                        return;
                    }

                    // Profile edits publish too; only a new token re-arms
                    let same = sessions
                        .borrow_and_update()
                        .credential()
                        .map(|c| c.same_token(&credential))
                        .unwrap_or(false);
                    if !same {
                        break;
                    }
                }
            }
        }
    }

    armed.store(false, Ordering::SeqCst);
}
