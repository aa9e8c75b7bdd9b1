use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::session::{AuthChangeEvent, AuthEvent, Session, User, UserMetadata};
use crate::backend::Backend;
use crate::config::AppConfig;
use crate::database::{Profile, ProfileInsert, ProfileRepository};
use crate::error::{AppError, AppResult};
use crate::validation;

// Signed-out access tokens remembered to ignore late notifications about them
const SIGNED_OUT_MEMORY: usize = 16;

/// Outcome of looking up the application profile for a session.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileStatus {
    Resolving,
    Resolved(Profile),
    /// Lookup timed out, or the row could neither be found nor created.
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Loading,
    Anonymous,
    Authenticated {
        session: Session,
        profile: ProfileStatus,
    },
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Uninitialized | SessionState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    /// Neither loading nor waiting on a profile lookup.
    pub fn is_settled(&self) -> bool {
        match self {
            SessionState::Uninitialized | SessionState::Loading => false,
            SessionState::Anonymous => true,
            SessionState::Authenticated { profile, .. } => *profile != ProfileStatus::Resolving,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session().map(|s| &s.user)
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            SessionState::Authenticated {
                profile: ProfileStatus::Resolved(profile),
                ..
            } => Some(profile),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.profile().map(Profile::is_admin).unwrap_or(false)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Loading => "loading",
            SessionState::Anonymous => "anonymous",
            SessionState::Authenticated { .. } => "authenticated",
        }
    }
}

/// Serializable snapshot of a [`SessionState`] for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub state: &'static str,
    pub profile_status: Option<&'static str>,
    pub user: Option<User>,
    pub profile: Option<Profile>,
    pub is_admin: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        let profile_status = match state {
            SessionState::Authenticated { profile, .. } => Some(match profile {
                ProfileStatus::Resolving => "resolving",
                ProfileStatus::Resolved(_) => "resolved",
                ProfileStatus::Missing => "missing",
            }),
            _ => None,
        };
        Self {
            state: state.label(),
            profile_status,
            user: state.user().cloned(),
            profile: state.profile().cloned(),
            is_admin: state.is_admin(),
            expires_at: state.session().and_then(Session::expires_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub profile_timeout: Duration,
    pub reset_redirect: String,
    pub allowed_email_domain: Option<String>,
}

impl ManagerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            profile_timeout: config.session.profile_timeout(),
            reset_redirect: config.site.reset_password_url(),
            allowed_email_domain: config.site.allowed_email_domain.clone(),
        }
    }
}

/// Handle on the notification listener started by [`SessionManager::start`].
/// Dropping it releases the subscription.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop listening for auth notifications.
    pub fn unsubscribe(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Owns the session state machine. State is published through a watch
/// channel; everyone else only reads it.
pub struct SessionManager {
    backend: Backend,
    profiles: ProfileRepository,
    options: ManagerOptions,
    state: watch::Sender<SessionState>,
    // Bumped by sign-out so in-flight resolutions cannot republish a session
    generation: AtomicU64,
    // Serializes session transitions
    transition: Mutex<()>,
    // Access tokens of the most recent sessions signed out locally
    signed_out: std::sync::Mutex<VecDeque<String>>,
}

impl SessionManager {
    pub fn new(backend: Backend, options: ManagerOptions) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            profiles: ProfileRepository::new(backend.store.clone()),
            backend,
            options,
            state,
            generation: AtomicU64::new(0),
            transition: Mutex::new(()),
            signed_out: std::sync::Mutex::new(VecDeque::with_capacity(SIGNED_OUT_MEMORY)),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Subscribe to provider notifications and look up the initial session.
    pub fn start(self: &Arc<Self>) -> Subscription {
        let events = self.backend.auth.subscribe();
        self.state.send_if_modified(|state| {
            if *state == SessionState::Uninitialized {
                *state = SessionState::Loading;
                true
            } else {
                false
            }
        });

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.listen(events).await });
        Subscription { handle }
    }

    async fn listen(self: Arc<Self>, mut events: broadcast::Receiver<AuthEvent>) {
        self.sync_from_backend(false).await;
        loop {
            match events.recv().await {
                Ok(event) => self.handle_event(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth notifications lagged, resynchronizing");
                    self.sync_from_backend(true).await;
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Auth notification channel closed");
                    break;
                }
            }
        }
    }

    async fn sync_from_backend(&self, dedupe: bool) {
        match self.backend.auth.get_session().await {
            Ok(Some(session)) => self.establish(session, dedupe).await,
            Ok(None) => self.clear().await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up the current session");
                self.clear().await;
            }
        }
    }

    async fn handle_event(&self, event: AuthEvent) {
        tracing::debug!(event = ?event.event, "Auth notification");
        match event.session {
            Some(session) => {
                let dedupe = matches!(
                    event.event,
                    AuthChangeEvent::SignedIn | AuthChangeEvent::InitialSession
                );
                self.establish(session, dedupe).await;
            }
            // Notifications can trail a newer sign-in; trust the provider's current session
            None => self.sync_from_backend(true).await,
        }
    }

    async fn clear(&self) {
        let _guard = self.transition.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);
        self.publish(generation, SessionState::Anonymous);
    }

    /// Publish `session` and resolve its profile. With `dedupe`, a session
    /// that is already current and settled is left alone.
    async fn establish(&self, session: Session, dedupe: bool) {
        let _guard = self.transition.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);
        let current = self.state.borrow().clone();

        if self.was_signed_out(&session) {
            tracing::debug!("Ignoring a session that was signed out locally");
            return;
        }

        if dedupe {
            if let SessionState::Authenticated { session: active, profile } = &current {
                if active.access_token == session.access_token && *profile != ProfileStatus::Resolving {
                    return;
                }
            }
        }

        if !current.is_loading() {
            let interim = match current.profile() {
                Some(profile) if profile.id == session.user.id => ProfileStatus::Resolved(profile.clone()),
                _ => ProfileStatus::Resolving,
            };
            self.publish(
                generation,
                SessionState::Authenticated {
                    session: session.clone(),
                    profile: interim,
                },
            );
        }

        let profile = self.resolve_profile(&session.user).await;
        self.publish(generation, SessionState::Authenticated { session, profile });
    }

    fn was_signed_out(&self, session: &Session) -> bool {
        let signed_out = self.signed_out.lock().unwrap_or_else(|e| e.into_inner());
        signed_out.contains(&session.access_token)
    }

    fn remember_signed_out(&self, access_token: &str) {
        let mut signed_out = self.signed_out.lock().unwrap_or_else(|e| e.into_inner());
        if signed_out.len() == SIGNED_OUT_MEMORY {
            signed_out.pop_front();
        }
        signed_out.push_back(access_token.to_string());
    }

    fn publish(&self, generation: u64, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation || *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    /// Fetch the profile for `user`, creating it when absent. Every outcome
    /// settles; a deadline overrun leaves the profile missing.
    async fn resolve_profile(&self, user: &User) -> ProfileStatus {
        let deadline = self.options.profile_timeout;
        match timeout(deadline, self.profiles.find_by_id(user.id)).await {
            Ok(Ok(Some(profile))) => ProfileStatus::Resolved(profile),
            Ok(Ok(None)) => self.create_profile(user).await,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, user_id = %user.id, "Profile lookup failed, creating one");
                self.create_profile(user).await
            }
            Err(_) => {
                let err = AppError::timeout(format!("Profile lookup exceeded {:?}", deadline));
                tracing::warn!(error = %err, user_id = %user.id, "Continuing without a profile");
                ProfileStatus::Missing
            }
        }
    }

    async fn create_profile(&self, user: &User) -> ProfileStatus {
        let Some(insert) = ProfileInsert::for_user(user) else {
            tracing::warn!(user_id = %user.id, "Cannot create a profile without an email");
            return ProfileStatus::Missing;
        };

        match timeout(self.options.profile_timeout, self.profiles.create(&insert)).await {
            Ok(Ok(profile)) => {
                tracing::info!(user_id = %user.id, "Created profile");
                ProfileStatus::Resolved(profile)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, user_id = %user.id, "Failed to create profile");
                ProfileStatus::Missing
            }
            Err(_) => {
                tracing::warn!(user_id = %user.id, "Profile creation exceeded the deadline");
                ProfileStatus::Missing
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<SessionState> {
        let domain = self.options.allowed_email_domain.as_deref();
        let email = validation::credentials(email, password, domain)?;

        let session = self.backend.auth.sign_in_with_password(&email, password).await?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.establish(session, true).await;
        Ok(self.state())
    }

    /// Register and, when the provider returns a session right away, sign in.
    pub async fn sign_up(&self, email: &str, password: &str, display_name: Option<&str>) -> AppResult<SessionState> {
        let domain = self.options.allowed_email_domain.as_deref();
        let email = validation::credentials(email, password, domain)?;
        let metadata = UserMetadata::with_full_name(display_name.map(str::to_string));

        match self.backend.auth.sign_up(&email, password, metadata).await? {
            Some(session) => {
                tracing::info!(user_id = %session.user.id, "Registered and signed in");
                self.establish(session, true).await;
            }
            None => tracing::info!("Registered, awaiting email confirmation"),
        }
        Ok(self.state())
    }

    /// Local state goes anonymous immediately; a backend failure is only logged.
    pub async fn sign_out(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.state.send_replace(SessionState::Anonymous);
        if let Some(session) = previous.session() {
            self.remember_signed_out(&session.access_token);
        }

        if let Err(e) = self.backend.auth.sign_out().await {
            tracing::warn!(error = %e, "Backend sign-out failed; local session already cleared");
        }
    }

    pub async fn reset_password(&self, email: &str) -> AppResult<()> {
        let email = validation::email(email, self.options.allowed_email_domain.as_deref())?;
        self.backend
            .auth
            .reset_password_for_email(&email, &self.options.reset_redirect)
            .await?;
        tracing::info!("Password reset requested");
        Ok(())
    }

    pub async fn update_password(&self, new_password: &str) -> AppResult<()> {
        validation::password(new_password)?;
        let user = self.backend.auth.update_password(new_password).await?;
        tracing::info!(user_id = %user.id, "Password updated");
        Ok(())
    }

    /// Re-resolve the current profile, e.g. after its role changed.
    pub async fn reload_profile(&self) {
        let session = self.state.borrow().session().cloned();
        if let Some(session) = session {
            self.establish(session, false).await;
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Resolved profile of the signed-in user.
    pub fn current_profile(&self) -> AppResult<Profile> {
        let state = self.state.borrow();
        match &*state {
            SessionState::Authenticated {
                profile: ProfileStatus::Resolved(profile),
                ..
            } => Ok(profile.clone()),
            SessionState::Authenticated { .. } => Err(AppError::auth("Your profile is not available")),
            _ => Err(AppError::auth("Sign in required")),
        }
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(predicate).await.map(|state| state.clone());
        match result {
            Ok(state) => state,
            // Unreachable while `self` owns the sender
            Err(_) => self.state(),
        }
    }

    pub async fn settled(&self) -> SessionState {
        self.wait_for(SessionState::is_settled).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryOp;
    use crate::backend::{AuthApi, MemoryBackend, Table};
    use serde_json::json;

    fn manager(memory: &Arc<MemoryBackend>) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Backend::memory(memory.clone()),
            ManagerOptions {
                profile_timeout: Duration::from_secs(5),
                reset_redirect: "http://localhost:3000/reset-password".into(),
                allowed_email_domain: None,
            },
        ))
    }

    #[tokio::test]
    async fn starts_anonymous_without_session() {
        let memory = Arc::new(MemoryBackend::new());
        let manager = manager(&memory);
        assert_eq!(manager.state(), SessionState::Uninitialized);

        let _subscription = manager.start();
        assert_eq!(manager.settled().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn sign_in_resolves_existing_profile() {
        let memory = Arc::new(MemoryBackend::new());
        let user = memory.seed_user("ops@example.com", "secret1", None);
        memory
            .insert_row(Table::Profiles, json!({"id": user.id, "email": "ops@example.com", "role": "admin"}))
            .unwrap();
        let manager = manager(&memory);

        let state = manager.sign_in("ops@example.com", "secret1").await.unwrap();
        assert!(state.is_admin());
        assert!(manager.is_admin());
        assert_eq!(memory.rows(Table::Profiles).len(), 1);
    }

    #[tokio::test]
    async fn invalid_credentials_never_reach_backend() {
        let memory = Arc::new(MemoryBackend::new());
        memory.fail(MemoryOp::SignIn);
        let manager = manager(&memory);

        let err = manager.sign_in("not-an-email", "x").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn wrong_password_is_auth_error() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed_user("ops@example.com", "secret1", None);
        let manager = manager(&memory);

        let err = manager.sign_in("ops@example.com", "secret2").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert!(!manager.state().is_authenticated());
    }

    #[tokio::test]
    async fn reset_password_links_back_to_site() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed_user("ops@example.com", "secret1", None);
        let manager = manager(&memory);

        manager.reset_password("ops@example.com").await.unwrap();
        let sent = memory.reset_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].redirect_to, "http://localhost:3000/reset-password");
    }

    #[tokio::test]
    async fn current_profile_requires_sign_in() {
        let memory = Arc::new(MemoryBackend::new());
        let manager = manager(&memory);
        assert!(matches!(manager.current_profile(), Err(AppError::Auth(_))));
    }

    #[tokio::test]
    async fn signed_out_tokens_are_bounded() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed_user("ops@example.com", "secret1", None);
        let manager = manager(&memory);

        for _ in 0..SIGNED_OUT_MEMORY + 8 {
            manager.sign_in("ops@example.com", "secret1").await.unwrap();
            manager.sign_out().await;
        }

        let remembered = manager.signed_out.lock().unwrap().len();
        assert_eq!(remembered, SIGNED_OUT_MEMORY);

        // The newest sign-out is still recognised
        let session = manager.sign_in("ops@example.com", "secret1").await.unwrap().session().cloned().unwrap();
        manager.sign_out().await;
        assert!(manager.was_signed_out(&session));
    }

    #[tokio::test]
    async fn unsubscribe_stops_listening() {
        let memory = Arc::new(MemoryBackend::new());
        memory.seed_user("ops@example.com", "secret1", None);
        let manager = manager(&memory);

        let subscription = manager.start();
        assert_eq!(manager.settled().await, SessionState::Anonymous);
        subscription.unsubscribe();
        tokio::task::yield_now().await;

        // Signing in behind the manager's back goes unnoticed now
        memory.sign_in_with_password("ops@example.com", "secret1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.state(), SessionState::Anonymous);
    }
}
