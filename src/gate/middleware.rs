// Route gate as axum middleware

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Router,
};
use tokio::sync::watch;

use super::{GateDecision, RouteGate};
use crate::auth::SessionState;

/// Seconds a client should wait before asking again while loading
const RETRY_AFTER_SECS: &str = "1";

const WAITING_PAGE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><meta http-equiv="refresh" content="1"><title>Loading</title></head>
<body><p>Checking your session...</p></body></html>"#;

#[derive(Clone)]
struct GateState {
    sessions: watch::Receiver<SessionState>,
    gate: RouteGate,
}

/// Put every route of `router` behind `gate`
///
/// The decision is taken against the latest published session state:
/// `Wait` answers 503 with a waiting page, `Redirect` answers 307.
pub fn protect<S>(
    router: Router<S>,
    sessions: watch::Receiver<SessionState>,
    gate: RouteGate,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(
        GateState { sessions, gate },
        gate_middleware,
    ))
}

async fn gate_middleware(
    State(state): State<GateState>,
    request: Request,
    next: Next,
) -> Response {
    let snapshot = state.sessions.borrow().clone();
    let path = request.uri().path().to_string();

    match state.gate.evaluate(&snapshot, &path) {
        GateDecision::Allow => next.run(request).await,
        GateDecision::Wait => {
            tracing::debug!(path = %path, "Session check pending, serving waiting page");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
                Html(WAITING_PAGE),
            )
                .into_response()
        }
        GateDecision::Redirect(location) => {
            tracing::debug!(path = %path, location = %location, "Gate redirect");
            Redirect::temporary(&location).into_response()
        }
    }
}
