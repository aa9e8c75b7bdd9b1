use axum::{extract::State, response::{IntoResponse, Redirect}};
use serde_json::json;

use crate::app::SharedContext;
use crate::middleware::gate::DASHBOARD_PATH;
use crate::middleware::ApiResponse;

/// GET /health
pub async fn health(State(context): State<SharedContext>) -> impl IntoResponse {
    let state = context.session.state();
    ApiResponse::success(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
        "session": state.label(),
    }))
}

/// Anything unrouted goes to the dashboard.
pub async fn fallback() -> Redirect {
    Redirect::to(DASHBOARD_PATH)
}
