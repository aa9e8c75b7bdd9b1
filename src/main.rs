use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use promptdeck::backend::MemorySessionStore;
use promptdeck::config::AppConfig;
use promptdeck::{app, AppContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up SUPABASE_URL and friends
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting promptdeck in {:?} mode", config.environment);

    let bind_addr = SocketAddr::new(config.server.host, config.server.port);
    let context = Arc::new(AppContext::init(config, Arc::new(MemorySessionStore::new()))?);
    let router = app::router(context.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("promptdeck listening on http://{}", bind_addr);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("Shutting down");
    Ok(())
}
