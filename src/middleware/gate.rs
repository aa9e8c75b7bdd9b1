//! Authorization gate: decides whether a route renders, waits for the
//! session state machine, or redirects.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::timeout;

use crate::auth::{ProfileStatus, SessionManager, SessionState};

pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";

const PUBLIC_PATHS: [&str; 5] = ["/login", "/register", "/forgot-password", "/logout", "/health"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Authenticated,
    Admin,
    /// `/` and anything not in the table
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Render,
    /// Session state not settled yet; show a neutral loading indicator.
    Suspend,
    Redirect(&'static str),
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

pub fn classify(path: &str) -> RouteAccess {
    let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };
    if PUBLIC_PATHS.contains(&path) {
        RouteAccess::Public
    } else if under(path, "/admin") {
        RouteAccess::Admin
    } else if under(path, DASHBOARD_PATH) {
        RouteAccess::Authenticated
    } else {
        RouteAccess::Unknown
    }
}

pub fn decide(path: &str, state: &SessionState) -> GateDecision {
    let access = classify(path);
    match access {
        RouteAccess::Public => return GateDecision::Render,
        RouteAccess::Unknown => return GateDecision::Redirect(DASHBOARD_PATH),
        RouteAccess::Authenticated | RouteAccess::Admin => {}
    }

    match state {
        SessionState::Uninitialized | SessionState::Loading => GateDecision::Suspend,
        SessionState::Anonymous => GateDecision::Redirect(LOGIN_PATH),
        SessionState::Authenticated { profile, .. } => {
            if access == RouteAccess::Authenticated {
                return GateDecision::Render;
            }
            match profile {
                ProfileStatus::Resolving => GateDecision::Suspend,
                ProfileStatus::Resolved(p) if p.is_admin() => GateDecision::Render,
                _ => GateDecision::Redirect(DASHBOARD_PATH),
            }
        }
    }
}

fn loading_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, "1")],
        Json(json!({
            "success": false,
            "code": "LOADING",
            "error": "Session is still loading"
        })),
    )
        .into_response()
}

/// Applies [`decide`] to every request. A suspended decision waits, bounded
/// by the profile deadline, for the state machine to settle.
pub async fn gate_middleware(
    State(session): State<Arc<SessionManager>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let mut decision = decide(&path, &session.state());

    if decision == GateDecision::Suspend {
        let deadline = session.options().profile_timeout;
        let settled = timeout(
            deadline,
            session.wait_for(|state| decide(&path, state) != GateDecision::Suspend),
        )
        .await;
        decision = match settled {
            Ok(state) => decide(&path, &state),
            Err(_) => GateDecision::Suspend,
        };
    }

    match decision {
        GateDecision::Render => next.run(request).await,
        GateDecision::Redirect(to) => {
            tracing::debug!(path = %path, to, "Gate redirect");
            Redirect::to(to).into_response()
        }
        GateDecision::Suspend => {
            tracing::debug!(path = %path, "Gate still loading");
            loading_response()
        }
    }
}
