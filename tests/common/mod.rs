#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use promptdeck::auth::{ManagerOptions, SessionManager, SessionState};
use promptdeck::backend::{Backend, MemoryBackend, Table};
use promptdeck::config::AppConfig;
use promptdeck::database::UserRole;
use promptdeck::{app, AppContext};

pub const PASSWORD: &str = "correct-horse";

pub fn test_config() -> AppConfig {
    let vars: HashMap<&str, &str> = [
        ("SUPABASE_URL", "http://127.0.0.1:54321"),
        ("SUPABASE_ANON_KEY", "test-anon-key"),
        ("PROMPTDECK_SITE_URL", "http://localhost:3000"),
    ]
    .into_iter()
    .collect();
    AppConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).expect("test config")
}

pub fn manager(memory: &Arc<MemoryBackend>, profile_timeout: Duration) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        Backend::memory(memory.clone()),
        ManagerOptions {
            profile_timeout,
            reset_redirect: "http://localhost:3000/reset-password".to_string(),
            allowed_email_domain: None,
        },
    ))
}

/// Account plus profile row with the given role.
pub fn seed_member(memory: &MemoryBackend, email: &str, role: UserRole) -> Uuid {
    let user = memory.seed_user(email, PASSWORD, None);
    memory
        .insert_row(
            Table::Profiles,
            json!({"id": user.id, "email": email, "role": role.as_str()}),
        )
        .expect("seed profile");
    user.id
}

pub fn seed_prompt(memory: &MemoryBackend, owner: Uuid, title: &str, tags: &[&str]) -> Uuid {
    let row = memory
        .insert_row(
            Table::Prompts,
            json!({
                "title": title,
                "prompt_content": format!("{} - full prompt text", title),
                "tags": tags,
                "created_by": owner,
            }),
        )
        .expect("seed prompt");
    row["id"].as_str().and_then(|id| id.parse().ok()).expect("prompt id")
}

/// Router as a client on the same machine sees it.
pub fn local_router(context: Arc<AppContext>) -> Router {
    router_from(context, SocketAddr::from(([127, 0, 0, 1], 40_000)))
}

pub fn router_from(context: Arc<AppContext>, peer: SocketAddr) -> Router {
    app::router(context).layer(MockConnectInfo(peer))
}

pub struct TestApp {
    pub memory: Arc<MemoryBackend>,
    pub context: Arc<AppContext>,
    pub router: Router,
}

impl TestApp {
    /// Context over a fresh in-memory backend with the listener started and
    /// the initial state settled.
    pub async fn start() -> Result<Self> {
        let memory = Arc::new(MemoryBackend::new());
        let mut context = AppContext::with_backend(test_config(), Backend::memory(memory.clone()));
        context.start();
        let context = Arc::new(context);
        context.session.settled().await;
        let router = local_router(context.clone());
        Ok(Self { memory, context, router })
    }

    pub async fn sign_in(&self, email: &str) -> Result<SessionState> {
        Ok(self.context.session.sign_in(email, PASSWORD).await?)
    }

    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await.context("router call")?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        Ok((status, value))
    }

    pub async fn location(&self, path: &str) -> Result<(StatusCode, Option<String>)> {
        let request = Request::builder().uri(path).body(Body::empty())?;
        let response = self.router.clone().oneshot(request).await?;
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((response.status(), location))
    }
}
