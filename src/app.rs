//! Application context: owns the configuration, the backend, the session
//! manager and the services built on them.
//!
//! Lifecycle: [`AppContext::init`] (or [`AppContext::with_backend`] followed
//! by [`AppContext::start`]) before use, [`AppContext::shutdown`] when done.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{ManagerOptions, SessionManager, Subscription};
use crate::backend::{Backend, SessionStore, SupabaseClient};
use crate::config::AppConfig;
use crate::database::{CategoryRepository, ProfileRepository, PromptRepository};
use crate::error::AppResult;
use crate::handlers::{elevated, protected, public};
use crate::middleware::{gate_middleware, loopback_only};
use crate::services::{CategoryService, PromptService, UserService};

pub struct AppContext {
    pub config: AppConfig,
    pub backend: Backend,
    pub session: Arc<SessionManager>,
    pub prompts: PromptService,
    pub categories: CategoryService,
    pub users: UserService,
    subscription: Option<Subscription>,
}

impl AppContext {
    /// Wire everything against `backend` without touching the network.
    pub fn with_backend(config: AppConfig, backend: Backend) -> Self {
        let session = Arc::new(SessionManager::new(backend.clone(), ManagerOptions::from_config(&config)));
        let profiles = ProfileRepository::new(backend.store.clone());
        let categories = CategoryRepository::new(backend.store.clone());
        let prompts = PromptRepository::new(backend.store.clone());

        Self {
            prompts: PromptService::new(prompts, categories.clone(), session.clone()),
            categories: CategoryService::new(categories, session.clone()),
            users: UserService::new(profiles, session.clone()),
            session,
            backend,
            config,
            subscription: None,
        }
    }

    /// Connect to the hosted backend and start the session manager.
    pub fn init(config: AppConfig, sessions: Arc<dyn SessionStore>) -> AppResult<Self> {
        let client = SupabaseClient::new(&config, sessions)?;
        tracing::info!(backend = %config.backend.url, environment = ?config.environment, "Initializing application");
        let mut context = Self::with_backend(config, Backend::supabase(Arc::new(client)));
        context.start();
        Ok(context)
    }

    /// Subscribe to auth notifications and look up the initial session.
    /// Calling it again is a no-op.
    pub fn start(&mut self) {
        if self.subscription.is_none() {
            self.subscription = Some(self.session.start());
        }
    }

    pub fn is_started(&self) -> bool {
        self.subscription.as_ref().map(Subscription::is_active).unwrap_or(false)
    }

    /// Release the auth subscription. The backend session itself is kept.
    pub fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            tracing::info!("Session listener stopped");
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub type SharedContext = Arc<AppContext>;

/// Web surface: every route sits behind the authorization gate, and the
/// whole router answers loopback peers only. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(context: SharedContext) -> Router {
    let gate = middleware::from_fn_with_state(context.session.clone(), gate_middleware);

    Router::new()
        .merge(public_routes())
        .merge(dashboard_routes())
        .merge(admin_routes())
        .fallback(public::fallback)
        .layer(gate)
        .with_state(context.clone())
        .layer(middleware::from_fn(loopback_only))
        .layer(cors_layer(&context.config))
        .layer(TraceLayer::new_for_http())
}

fn public_routes() -> Router<SharedContext> {
    Router::new()
        .route("/health", get(public::health))
        .route("/login", get(public::login_page).post(public::login_post))
        .route("/register", get(public::register_page).post(public::register_post))
        .route(
            "/forgot-password",
            get(public::forgot_password_page).post(public::forgot_password_post),
        )
        .route("/logout", post(public::logout_post))
}

fn dashboard_routes() -> Router<SharedContext> {
    Router::new()
        .route("/dashboard", get(protected::dashboard_get))
        .route("/dashboard/prompts", post(protected::prompt_post))
        .route(
            "/dashboard/prompts/:id",
            get(protected::prompt_get)
                .put(protected::prompt_put)
                .delete(protected::prompt_delete),
        )
        .route("/dashboard/prompts/:id/use", post(protected::prompt_use))
}

fn admin_routes() -> Router<SharedContext> {
    Router::new()
        .route("/admin", get(elevated::admin_get))
        .route("/admin/users", get(elevated::users_get))
        .route("/admin/users/:id/role", put(elevated::user_role_put))
        .route(
            "/admin/categories",
            get(elevated::categories_get).post(elevated::category_post),
        )
        .route(
            "/admin/categories/:id",
            put(elevated::category_put).delete(elevated::category_delete),
        )
}

/// Cross-origin access is opt-in per origin; an empty list allows none.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.server.enable_cors || config.server.cors_origins.is_empty() {
        return CorsLayer::new();
    }
    let origins: Vec<_> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
