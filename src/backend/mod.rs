//! Contract with the hosted backend: an identity provider ([`AuthApi`]) and
//! a relational store ([`Store`]). Everything above this module talks to the
//! backend only through these two traits.

pub mod memory;
pub mod session_store;
pub mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::auth::{AuthEvent, Session, User, UserMetadata};
use crate::filter::{Filter, FilterError};

pub use memory::MemoryBackend;
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use supabase::SupabaseClient;

/// Name of the atomic usage counter procedure.
pub const INCREMENT_USAGE_FN: &str = "increment_usage_count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Profiles,
    Categories,
    Prompts,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Categories => "categories",
            Table::Prompts => "prompts",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failures reported by a backend implementation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Backend returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<FilterError> for BackendError {
    fn from(err: FilterError) -> Self {
        BackendError::InvalidRequest(err.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

/// Hosted identity provider.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Returns the new session, or `None` when the provider requires email
    /// confirmation before the first sign-in.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<Option<Session>, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Sends an out-of-band reset message linking back to `redirect_to`.
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), BackendError>;

    async fn update_password(&self, new_password: &str) -> Result<User, BackendError>;

    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    async fn get_user(&self) -> Result<Option<User>, BackendError>;

    /// Auth-state notifications, delivered in emission order.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Hosted relational store with row-level security applied server-side.
#[async_trait]
pub trait Store: Send + Sync {
    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<Value>, BackendError>;

    /// Insert one row; the returned representation honours `returning`'s embeds.
    async fn insert(&self, table: Table, row: Value, returning: &Filter) -> Result<Value, BackendError>;

    /// Patch every row matching `filter`, returning the updated rows.
    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<Vec<Value>, BackendError>;

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), BackendError>;

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError>;
}

/// Both halves of a backend, shareable across tasks.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthApi>,
    pub store: Arc<dyn Store>,
}

impl Backend {
    pub fn new(auth: Arc<dyn AuthApi>, store: Arc<dyn Store>) -> Self {
        Self { auth, store }
    }

    pub fn supabase(client: Arc<SupabaseClient>) -> Self {
        Self {
            auth: client.clone(),
            store: client,
        }
    }

    pub fn memory(backend: Arc<MemoryBackend>) -> Self {
        Self {
            auth: backend.clone(),
            store: backend,
        }
    }
}
