//! In-process backend implementing both halves of the contract. Used by the
//! test suite and for running the app without a hosted project. Latency and
//! failures can be injected per operation.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{AuthApi, BackendError, Store, Table, INCREMENT_USAGE_FN};
use crate::auth::claims::{encode_token, Claims};
use crate::auth::{AuthChangeEvent, AuthEvent, Session, User, UserMetadata};
use crate::filter::Filter;

const EVENT_CAPACITY: usize = 64;
const TOKEN_TTL_SECS: i64 = 3600;

/// Operations that can be slowed down or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    SignUp,
    SignIn,
    SignOut,
    ResetPassword,
    UpdatePassword,
    GetSession,
    Select(Table),
    Insert(Table),
    Update(Table),
    Delete(Table),
    Rpc,
}

/// Password reset message "sent" by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetMessage {
    pub email: String,
    pub redirect_to: String,
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    tables: HashMap<Table, Vec<Value>>,
    outbox: Vec<ResetMessage>,
}

pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    latency: Mutex<HashMap<MemoryOp, Duration>>,
    failures: Mutex<HashSet<MemoryOp>>,
    events: broadcast::Sender<AuthEvent>,
    secret: Vec<u8>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(MemoryState::default()),
            latency: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashSet::new()),
            events,
            secret: Uuid::new_v4().as_bytes().to_vec(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not wedge every other test
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_latency(&self, op: MemoryOp, delay: Duration) {
        self.latency.lock().unwrap_or_else(|e| e.into_inner()).insert(op, delay);
    }

    pub fn fail(&self, op: MemoryOp) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).insert(op);
    }

    pub fn heal(&self, op: MemoryOp) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).remove(&op);
    }

    async fn enter(&self, op: MemoryOp) -> Result<(), BackendError> {
        let delay = self
            .latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&op)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&op);
        if failing {
            return Err(BackendError::Http {
                status: 500,
                message: format!("simulated failure: {:?}", op),
            });
        }
        Ok(())
    }

    /// Register an account without signing in.
    pub fn seed_user(&self, email: &str, password: &str, full_name: Option<&str>) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: UserMetadata::with_full_name(full_name.map(str::to_string)),
        };
        self.state().accounts.insert(
            email.to_lowercase(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Insert a row directly, bypassing latency and failure injection.
    pub fn insert_row(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let mut state = self.state();
        insert_locked(&mut state, table, row)
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.state().tables.get(&table).cloned().unwrap_or_default()
    }

    pub fn reset_messages(&self) -> Vec<ResetMessage> {
        self.state().outbox.clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state().session.clone()
    }

    pub fn password_of(&self, email: &str) -> Option<String> {
        self.state()
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.password.clone())
    }

    /// Issue a fresh access token for the current session, as the provider
    /// does on its refresh timer.
    pub fn refresh_now(&self) -> Result<Option<Session>, BackendError> {
        let refreshed = {
            let mut state = self.state();
            let Some(current) = state.session.clone() else {
                return Ok(None);
            };
            let session = self.mint_session(current.user)?;
            state.session = Some(session.clone());
            session
        };
        self.emit(AuthChangeEvent::TokenRefreshed, Some(refreshed.clone()));
        Ok(Some(refreshed))
    }

    /// Drop the session without a sign-out call, e.g. revoked elsewhere.
    pub fn expire_session(&self) {
        self.state().session = None;
        self.emit(AuthChangeEvent::SignedOut, None);
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        let _ = self.events.send(AuthEvent::new(event, session));
    }

    fn mint_session(&self, user: User) -> Result<Session, BackendError> {
        let claims = Claims::new(&user, chrono::Duration::seconds(TOKEN_TTL_SECS));
        let access_token = encode_token(&claims, &self.secret).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(Session {
            access_token,
            refresh_token: Uuid::new_v4().simple().to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(TOKEN_TTL_SECS),
            expires_at: Some(claims.exp),
            user,
        })
    }
}

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<Option<Session>, BackendError> {
        self.enter(MemoryOp::SignUp).await?;
        let session = {
            let mut state = self.state();
            let key = email.to_lowercase();
            if state.accounts.contains_key(&key) {
                return Err(BackendError::Unauthorized("User already registered".to_string()));
            }
            let user = User {
                id: Uuid::new_v4(),
                email: Some(email.to_string()),
                user_metadata: metadata,
            };
            state.accounts.insert(
                key,
                Account {
                    user: user.clone(),
                    password: password.to_string(),
                },
            );
            let session = self.mint_session(user)?;
            state.session = Some(session.clone());
            session
        };
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(Some(session))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.enter(MemoryOp::SignIn).await?;
        let session = {
            let mut state = self.state();
            let user = match state.accounts.get(&email.to_lowercase()) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(BackendError::Unauthorized("Invalid login credentials".to_string())),
            };
            let session = self.mint_session(user)?;
            state.session = Some(session.clone());
            session
        };
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.enter(MemoryOp::SignOut).await?;
        self.state().session = None;
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), BackendError> {
        self.enter(MemoryOp::ResetPassword).await?;
        let mut state = self.state();
        // Unknown addresses succeed silently so accounts cannot be enumerated
        if state.accounts.contains_key(&email.to_lowercase()) {
            state.outbox.push(ResetMessage {
                email: email.to_string(),
                redirect_to: redirect_to.to_string(),
            });
        }
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<User, BackendError> {
        self.enter(MemoryOp::UpdatePassword).await?;
        let session = {
            let mut state = self.state();
            let Some(session) = state.session.clone() else {
                return Err(BackendError::Unauthorized("Auth session missing".to_string()));
            };
            let key = session.user.email.clone().unwrap_or_default().to_lowercase();
            match state.accounts.get_mut(&key) {
                Some(account) => account.password = new_password.to_string(),
                None => return Err(BackendError::Unauthorized("User not found".to_string())),
            }
            session
        };
        self.emit(AuthChangeEvent::UserUpdated, Some(session.clone()));
        Ok(session.user)
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.enter(MemoryOp::GetSession).await?;
        Ok(self.state().session.clone())
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        Ok(self.state().session.as_ref().map(|s| s.user.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl Store for MemoryBackend {
    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<Value>, BackendError> {
        self.enter(MemoryOp::Select(table)).await?;
        filter.validate()?;
        let state = self.state();
        let rows = state.tables.get(&table).cloned().unwrap_or_default();
        Ok(filter
            .apply(rows)
            .into_iter()
            .map(|row| embed_locked(&state, filter, row))
            .collect())
    }

    async fn insert(&self, table: Table, row: Value, returning: &Filter) -> Result<Value, BackendError> {
        self.enter(MemoryOp::Insert(table)).await?;
        returning.validate()?;
        let mut state = self.state();
        let inserted = insert_locked(&mut state, table, row)?;
        Ok(embed_locked(&state, returning, inserted))
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<Vec<Value>, BackendError> {
        self.enter(MemoryOp::Update(table)).await?;
        filter.validate()?;
        let Value::Object(patch) = patch else {
            return Err(BackendError::InvalidRequest("patch must be an object".to_string()));
        };

        let mut state = self.state();
        let mut updated = Vec::new();
        if let Some(rows) = state.tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                if let Value::Object(fields) = row {
                    for (key, value) in &patch {
                        if key != "id" {
                            fields.insert(key.clone(), value.clone());
                        }
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated
            .into_iter()
            .map(|row| embed_locked(&state, filter, row))
            .collect())
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), BackendError> {
        self.enter(MemoryOp::Delete(table)).await?;
        filter.validate()?;
        if filter.conditions().is_empty() {
            return Err(BackendError::InvalidRequest("refusing unfiltered delete".to_string()));
        }
        let mut state = self.state();
        if let Some(rows) = state.tables.get_mut(&table) {
            rows.retain(|r| !filter.matches(r));
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError> {
        self.enter(MemoryOp::Rpc).await?;
        if function != INCREMENT_USAGE_FN {
            return Err(BackendError::NotFound(format!("function {} not found", function)));
        }
        let prompt_id = args
            .get("prompt_id")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::InvalidRequest("prompt_id is required".to_string()))?
            .to_string();

        // Read and write under one lock acquisition
        let mut state = self.state();
        if let Some(rows) = state.tables.get_mut(&Table::Prompts) {
            if let Some(row) = rows.iter_mut().find(|r| r["id"] == Value::String(prompt_id.clone())) {
                let count = row["usage_count"].as_i64().unwrap_or(0);
                row["usage_count"] = json!(count + 1);
            }
        }
        Ok(Value::Null)
    }
}

fn now_timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn set_default(fields: &mut Map<String, Value>, key: &str, value: Value) {
    let missing = fields.get(key).map(Value::is_null).unwrap_or(true);
    if missing {
        fields.insert(key.to_string(), value);
    }
}

fn exists(state: &MemoryState, table: Table, id: &Value) -> bool {
    state
        .tables
        .get(&table)
        .map(|rows| rows.iter().any(|r| &r["id"] == id))
        .unwrap_or(false)
}

fn check_reference(state: &MemoryState, fields: &Map<String, Value>, column: &str, target: Table) -> Result<(), BackendError> {
    match fields.get(column) {
        None | Some(Value::Null) => Ok(()),
        Some(id) if exists(state, target, id) => Ok(()),
        Some(id) => Err(BackendError::Http {
            status: 409,
            message: format!("{} {} violates foreign key constraint on {}", column, id, target),
        }),
    }
}

fn insert_locked(state: &mut MemoryState, table: Table, row: Value) -> Result<Value, BackendError> {
    let Value::Object(mut fields) = row else {
        return Err(BackendError::InvalidRequest("row must be an object".to_string()));
    };

    set_default(&mut fields, "id", Value::String(Uuid::new_v4().to_string()));
    set_default(&mut fields, "created_at", now_timestamp());
    match table {
        Table::Profiles => {
            set_default(&mut fields, "full_name", Value::Null);
            set_default(&mut fields, "role", json!("user"));
            set_default(&mut fields, "updated_at", now_timestamp());
        }
        Table::Categories => {
            set_default(&mut fields, "description", Value::Null);
            check_reference(state, &fields, "created_by", Table::Profiles)?;
        }
        Table::Prompts => {
            set_default(&mut fields, "description", Value::Null);
            set_default(&mut fields, "category_id", Value::Null);
            set_default(&mut fields, "tags", json!([]));
            set_default(&mut fields, "is_public", json!(true));
            set_default(&mut fields, "usage_count", json!(0));
            set_default(&mut fields, "updated_at", now_timestamp());
            check_reference(state, &fields, "created_by", Table::Profiles)?;
            check_reference(state, &fields, "category_id", Table::Categories)?;
        }
    }

    let id = fields["id"].clone();
    if exists(state, table, &id) {
        return Err(BackendError::Http {
            status: 409,
            message: format!("duplicate key value violates unique constraint \"{}_pkey\"", table),
        });
    }

    let row = Value::Object(fields);
    state.tables.entry(table).or_default().push(row.clone());
    Ok(row)
}

fn embed_locked(state: &MemoryState, filter: &Filter, mut row: Value) -> Value {
    for embed in filter.embeds() {
        let key = row.get(&embed.foreign_key).cloned().unwrap_or(Value::Null);
        let related = if key.is_null() {
            Value::Null
        } else {
            state
                .tables
                .get(&embed.table)
                .and_then(|rows| rows.iter().find(|r| r["id"] == key))
                .cloned()
                .unwrap_or(Value::Null)
        };
        if let Value::Object(fields) = &mut row {
            fields.insert(embed.alias.clone(), related);
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_checks_password() {
        let backend = MemoryBackend::new();
        backend.seed_user("lee@example.com", "hunter22", None);

        let err = backend.sign_in_with_password("lee@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, BackendError::Unauthorized(_)));

        let session = backend.sign_in_with_password("LEE@example.com", "hunter22").await.unwrap();
        assert_eq!(session.user.email.as_deref(), Some("lee@example.com"));
        assert_eq!(backend.get_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn sign_in_emits_notification() {
        let backend = MemoryBackend::new();
        backend.seed_user("lee@example.com", "hunter22", None);
        let mut events = backend.subscribe();

        backend.sign_in_with_password("lee@example.com", "hunter22").await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.event, AuthChangeEvent::SignedIn);
        assert!(event.session.is_some());
    }

    #[tokio::test]
    async fn insert_fills_defaults_and_checks_references() {
        let backend = MemoryBackend::new();
        let orphan = json!({"title": "t", "prompt_content": "c", "created_by": Uuid::new_v4().to_string()});
        let err = backend.insert(Table::Prompts, orphan, &Filter::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::Http { status: 409, .. }));

        let profile = backend
            .insert_row(Table::Profiles, json!({"id": Uuid::new_v4().to_string(), "email": "a@example.com"}))
            .unwrap();
        assert_eq!(profile["role"], "user");

        let prompt = json!({"title": "t", "prompt_content": "c", "created_by": profile["id"]});
        let row = backend.insert(Table::Prompts, prompt, &Filter::new()).await.unwrap();
        assert_eq!(row["usage_count"], 0);
        assert_eq!(row["is_public"], true);
        assert_eq!(row["tags"], json!([]));
    }

    #[tokio::test]
    async fn select_embeds_relations() {
        let backend = MemoryBackend::new();
        let profile = backend
            .insert_row(Table::Profiles, json!({"id": Uuid::new_v4().to_string(), "email": "a@example.com"}))
            .unwrap();
        backend
            .insert_row(Table::Prompts, json!({"title": "t", "prompt_content": "c", "created_by": profile["id"]}))
            .unwrap();

        let filter = Filter::new()
            .embed("profile", Table::Profiles, "created_by")
            .embed("category", Table::Categories, "category_id");
        let rows = backend.select(Table::Prompts, &filter).await.unwrap();
        assert_eq!(rows[0]["profile"]["email"], "a@example.com");
        assert!(rows[0]["category"].is_null());
    }

    #[tokio::test]
    async fn injected_failure_is_reported() {
        let backend = MemoryBackend::new();
        backend.fail(MemoryOp::Select(Table::Categories));
        assert!(backend.select(Table::Categories, &Filter::new()).await.is_err());
        backend.heal(MemoryOp::Select(Table::Categories));
        assert!(backend.select(Table::Categories, &Filter::new()).await.is_ok());
    }
}
