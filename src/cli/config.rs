use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::app::AppContext;
use crate::backend::FileSessionStore;
use crate::config::AppConfig;

pub const SESSION_FILE: &str = "session.json";

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("PROMPTDECK_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("promptdeck")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn session_file() -> anyhow::Result<PathBuf> {
    Ok(get_config_dir()?.join(SESSION_FILE))
}

/// Build the application context against the hosted backend, restoring the
/// saved session, and wait for the session state to settle.
pub async fn open_context() -> anyhow::Result<AppContext> {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env()?;
    let store = FileSessionStore::new(session_file()?);
    let context = AppContext::init(config, Arc::new(store))?;
    let state = context.session.settled().await;
    tracing::debug!(state = state.label(), "Session ready");
    Ok(context)
}
