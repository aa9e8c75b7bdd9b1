//! HTTP client for a Supabase-style backend: GoTrue under `/auth/v1` and
//! PostgREST under `/rest/v1`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use url::Url;

use super::{AuthApi, BackendError, SessionStore, Store, Table};
use crate::auth::{AuthChangeEvent, AuthEvent, Session, User, UserMetadata};
use crate::config::AppConfig;
use crate::filter::Filter;

const EVENT_CAPACITY: usize = 32;

/// Refresh this long before the access token actually expires.
const REFRESH_MARGIN_SECS: i64 = 60;

// PostgREST's "no rows" code for single-object requests
const PGRST_NO_ROWS: &str = "PGRST116";

#[derive(Clone, Copy)]
enum Surface {
    Auth,
    Rest,
}

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    sessions: Arc<dyn SessionStore>,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    auto_refresh: bool,
    // Concurrent callers share one refresh round-trip
    refresh_lock: Mutex<()>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig, sessions: Arc<dyn SessionStore>) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&config.backend.anon_key)
            .map_err(|e| BackendError::InvalidRequest(format!("anon key: {}", e)))?;
        headers.insert("apikey", api_key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.backend.request_timeout_secs))
            .build()?;

        // Url::join replaces the last path segment unless the base ends in '/'
        let mut base_url = config.backend.url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let current = if config.session.persist_session {
            sessions.load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring unreadable stored session");
                None
            })
        } else {
            None
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            http,
            base_url,
            anon_key: config.backend.anon_key.clone(),
            sessions,
            current: RwLock::new(current),
            events,
            auto_refresh: config.session.auto_refresh_token,
            refresh_lock: Mutex::new(()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::InvalidRequest(format!("{}: {}", path, e)))
    }

    fn current_session(&self) -> Option<Session> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    fn needs_refresh(&self, session: &Session) -> bool {
        self.auto_refresh && session.is_expired(chrono::Duration::seconds(REFRESH_MARGIN_SECS))
    }

    /// The current session, refreshed first when its access token is within
    /// the refresh margin. A rejected refresh token signs the user out.
    async fn fresh_session(&self) -> Result<Option<Session>, BackendError> {
        match self.current_session() {
            Some(session) if self.needs_refresh(&session) => {}
            other => return Ok(other),
        }

        let _guard = self.refresh_lock.lock().await;
        // Someone else may have refreshed or signed out while we waited
        let session = match self.current_session() {
            Some(session) if self.needs_refresh(&session) => session,
            other => return Ok(other),
        };

        match self.refresh_session(&session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(BackendError::Unauthorized(msg)) => {
                tracing::info!(reason = %msg, "Refresh token rejected, clearing session");
                self.set_session(None, AuthChangeEvent::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Authorization header for the next request: the user's access token,
    /// or the anon key when nobody is signed in.
    async fn bearer(&self) -> Result<String, BackendError> {
        let signed_in = self.current_session().is_some();
        match self.fresh_session().await? {
            Some(session) => Ok(format!("Bearer {}", session.access_token)),
            None if signed_in => Err(BackendError::Unauthorized("Session expired, sign in again".to_string())),
            None => Ok(format!("Bearer {}", self.anon_key)),
        }
    }

    /// Replace the local session, persist it and notify subscribers.
    fn set_session(&self, session: Option<Session>, event: AuthChangeEvent) {
        if let Ok(mut guard) = self.current.write() {
            *guard = session.clone();
        }

        let persisted = match &session {
            Some(s) => self.sessions.save(s),
            None => self.sessions.clear(),
        };
        if let Err(e) = persisted {
            tracing::warn!(error = %e, "Failed to persist session");
        }

        // No receivers is not an error
        let _ = self.events.send(AuthEvent::new(event, session));
    }

    async fn send(&self, request: RequestBuilder, surface: Surface) -> Result<Response, BackendError> {
        let bearer = self.bearer().await?;
        let response = request.header(AUTHORIZATION, bearer).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response, surface).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, surface: Surface) -> Result<T, BackendError> {
        let response = self.send(request, surface).await?;
        response.json::<T>().await.map_err(BackendError::from)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        // Refresh with the anon key; the access token has expired
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.anon_key))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, Surface::Auth).await);
        }
        let session = response.json::<Session>().await?.with_expiry();

        tracing::debug!(user_id = %session.user.id, "Access token refreshed");
        self.set_session(Some(session.clone()), AuthChangeEvent::TokenRefreshed);
        Ok(session)
    }

    fn rest_url(&self, table: Table, pairs: &[(String, String)]) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{}", table.as_str()))?;
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl AuthApi for SupabaseClient {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<Option<Session>, BackendError> {
        let url = self.endpoint("auth/v1/signup")?;
        let body = json!({ "email": email, "password": password, "data": metadata });
        let payload: Value = self.send_json(self.http.post(url).json(&body), Surface::Auth).await?;

        // Without autoconfirm the provider answers with the bare user
        if payload.get("access_token").is_none() {
            tracing::info!(email, "Sign-up pending email confirmation");
            return Ok(None);
        }

        let session = serde_json::from_value::<Session>(payload)
            .map_err(|e| BackendError::Decode(e.to_string()))?
            .with_expiry();
        self.set_session(Some(session.clone()), AuthChangeEvent::SignedIn);
        Ok(Some(session))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let body = json!({ "email": email, "password": password });
        let session = self
            .send_json::<Session>(self.http.post(url).json(&body), Surface::Auth)
            .await?
            .with_expiry();

        self.set_session(Some(session.clone()), AuthChangeEvent::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let token = self.current_session().map(|s| s.access_token);
        self.set_session(None, AuthChangeEvent::SignedOut);

        let Some(token) = token else {
            return Ok(());
        };
        let url = self.endpoint("auth/v1/logout")?;
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response, Surface::Auth).await)
        }
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), BackendError> {
        let mut url = self.endpoint("auth/v1/recover")?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        self.send(self.http.post(url).json(&json!({ "email": email })), Surface::Auth)
            .await?;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<User, BackendError> {
        if self.current_session().is_none() {
            return Err(BackendError::Unauthorized("Auth session missing".to_string()));
        }
        let url = self.endpoint("auth/v1/user")?;
        let user: User = self
            .send_json(self.http.put(url).json(&json!({ "password": new_password })), Surface::Auth)
            .await?;

        // The request may have refreshed the session on its way out
        let Some(mut session) = self.current_session() else {
            return Err(BackendError::Unauthorized("Auth session missing".to_string()));
        };
        session.user = user.clone();
        self.set_session(Some(session), AuthChangeEvent::UserUpdated);
        Ok(user)
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.fresh_session().await
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        if self.current_session().is_none() {
            return Ok(None);
        }
        let url = self.endpoint("auth/v1/user")?;
        let user = self.send_json::<User>(self.http.get(url), Surface::Auth).await?;
        Ok(Some(user))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl Store for SupabaseClient {
    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<Value>, BackendError> {
        let url = self.rest_url(table, &filter.to_query_pairs()?)?;
        tracing::debug!(%table, query = url.query().unwrap_or(""), "select");
        self.send_json(self.http.get(url), Surface::Rest).await
    }

    async fn insert(&self, table: Table, row: Value, returning: &Filter) -> Result<Value, BackendError> {
        let pairs = vec![("select".to_string(), returning.select_clause())];
        let url = self.rest_url(table, &pairs)?;
        let rows: Vec<Value> = self
            .send_json(
                self.http
                    .post(url)
                    .header("Prefer", "return=representation")
                    .json(&row),
                Surface::Rest,
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode(format!("insert into {} returned no row", table)))
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<Vec<Value>, BackendError> {
        let mut pairs = filter.to_where_pairs()?;
        pairs.push(("select".to_string(), filter.select_clause()));
        let url = self.rest_url(table, &pairs)?;
        self.send_json(
            self.http
                .patch(url)
                .header("Prefer", "return=representation")
                .json(&patch),
            Surface::Rest,
        )
        .await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), BackendError> {
        let pairs = filter.to_where_pairs()?;
        if pairs.is_empty() {
            return Err(BackendError::InvalidRequest("refusing unfiltered delete".to_string()));
        }
        let url = self.rest_url(table, &pairs)?;
        self.send(self.http.delete(url), Surface::Rest).await?;
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError> {
        crate::filter::filter_where::validate_column(function)?;
        let url = self.endpoint(&format!("rest/v1/rpc/{}", function))?;
        let response = self.send(self.http.post(url).json(&args), Surface::Rest).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

async fn error_from_response(response: Response, surface: Surface) -> BackendError {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    let code = body.get("code").and_then(Value::as_str).unwrap_or("");

    match (surface, status) {
        // The identity provider reports bad credentials as 400/422
        (Surface::Auth, StatusCode::BAD_REQUEST)
        | (Surface::Auth, StatusCode::UNPROCESSABLE_ENTITY)
        | (_, StatusCode::UNAUTHORIZED)
        | (_, StatusCode::FORBIDDEN) => BackendError::Unauthorized(message),
        (_, StatusCode::NOT_FOUND) => BackendError::NotFound(message),
        (Surface::Rest, _) if code == PGRST_NO_ROWS => BackendError::NotFound(message),
        (_, StatusCode::REQUEST_TIMEOUT) | (_, StatusCode::GATEWAY_TIMEOUT) => BackendError::Timeout(message),
        _ => BackendError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

fn error_message(body: &Value) -> Option<String> {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
