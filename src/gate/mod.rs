// Protected route gate
// Decides whether a view may render for the current session state

pub mod middleware;

use crate::auth::SessionState;

pub const LOGIN_PATH: &str = "/login";
pub const PRICING_PATH: &str = "/pricing";

/// Result of evaluating a gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Session check still running; show a neutral waiting view
    Wait,
    /// Render the protected view
    Allow,
    /// Send the visitor elsewhere
    Redirect(String),
}

/// Access rule of one protected view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteGate {
    require_subscription: bool,
}

impl RouteGate {
    /// Any signed-in user
    pub fn authenticated() -> Self {
        Self {
            require_subscription: false,
        }
    }

    /// Signed-in user on a paid tier
    pub fn subscribed() -> Self {
        Self {
            require_subscription: true,
        }
    }

    pub fn requires_subscription(&self) -> bool {
        self.require_subscription
    }

    /// Evaluate the gate for `path` (the current pathname, no query)
    ///
    /// Never redirects while the initial session check is loading.
    pub fn evaluate(&self, state: &SessionState, path: &str) -> GateDecision {
        if state.is_loading() {
            return GateDecision::Wait;
        }

        let Some(user) = state.user() else {
            if path == LOGIN_PATH {
                return GateDecision::Allow;
            }
            return GateDecision::Redirect(login_redirect(path));
        };

        if self.require_subscription && !user.subscription_tier.is_paid() {
            return GateDecision::Redirect(PRICING_PATH.to_string());
        }

        GateDecision::Allow
    }
}

/// `/login?callbackUrl=<path>` with the path percent-encoded
pub fn login_redirect(path: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("{}?callbackUrl={}", LOGIN_PATH, encoded)
}
