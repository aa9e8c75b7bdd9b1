// handlers/public/auth.rs - Sign-in, registration, password reset, sign-out

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::SharedContext;
use crate::auth::SessionSummary;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

fn page(view: &str, fields: &[&str], context: &SharedContext) -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "view": view,
        "fields": fields,
        "email_domain": context.config.site.allowed_email_domain,
        "session": SessionSummary::from(&context.session.state()),
    }))
}

/// GET /login
pub async fn login_page(State(context): State<SharedContext>) -> impl IntoResponse {
    page("login", &["email", "password"], &context)
}

/// POST /login - Sign in with email and password
pub async fn login_post(
    State(context): State<SharedContext>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<SessionSummary> {
    let state = context.session.sign_in(&request.email, &request.password).await?;
    Ok(ApiResponse::success(SessionSummary::from(&state)))
}

/// GET /register
pub async fn register_page(State(context): State<SharedContext>) -> impl IntoResponse {
    page("register", &["email", "password", "full_name"], &context)
}

/// POST /register - Create an account. Without a session in the response
/// the provider is waiting for email confirmation.
pub async fn register_post(
    State(context): State<SharedContext>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Value> {
    let state = context
        .session
        .sign_up(&request.email, &request.password, request.full_name.as_deref())
        .await?;
    let confirmation_required = !state.is_authenticated();
    Ok(ApiResponse::created(json!({
        "confirmation_required": confirmation_required,
        "session": SessionSummary::from(&state),
    })))
}

/// GET /forgot-password
pub async fn forgot_password_page(State(context): State<SharedContext>) -> impl IntoResponse {
    page("forgot-password", &["email"], &context)
}

/// POST /forgot-password - Send a reset link
pub async fn forgot_password_post(
    State(context): State<SharedContext>,
    Json(request): Json<ForgotPasswordRequest>,
) -> ApiResult<Value> {
    context.session.reset_password(&request.email).await?;
    Ok(ApiResponse::success(json!({
        "sent": true,
        "redirect_to": context.session.options().reset_redirect,
    })))
}

/// POST /logout - Always succeeds locally
pub async fn logout_post(State(context): State<SharedContext>) -> ApiResult<SessionSummary> {
    context.session.sign_out().await;
    Ok(ApiResponse::success(SessionSummary::from(&context.session.state())))
}
