//! Session state and startup hydration.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::User,
    error::ApiError,
    protocol::{ApiResponse, LoginRequest, LoginResponse, MeResponse},
};
use storage::{keys, KeyValueStore};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{error::SessionError, permissions::Permissions};

/// Remote identity endpoints.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse>;
    /// Confirms the identity behind `token`.
    async fn me(&self, token: &str) -> Result<MeResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Hydrating,
    Authenticated,
}

/// Authentication snapshot. Authenticated exactly when a user is present, and a user is
/// only ever stored together with its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<User>,
    token: Option<String>,
    is_loading: bool,
}

impl Session {
    pub fn unauthenticated() -> Self {
        Self {
            user: None,
            token: None,
            is_loading: false,
        }
    }

    pub fn authenticated(user: User, token: impl Into<String>) -> Self {
        Self {
            user: Some(user),
            token: Some(token.into()),
            is_loading: false,
        }
    }

    fn pending() -> Self {
        Self {
            is_loading: true,
            ..Self::unauthenticated()
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn phase(&self) -> SessionPhase {
        if self.user.is_some() {
            SessionPhase::Authenticated
        } else if self.is_loading {
            SessionPhase::Hydrating
        } else {
            SessionPhase::Unauthenticated
        }
    }
}

/// Clears `is_loading` when dropped, whichever way hydration ends.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<Session>,
}

impl<'a> LoadingGuard<'a> {
    fn begin(state: &'a watch::Sender<Session>) -> Self {
        state.send_modify(|session| session.is_loading = true);
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|session| session.is_loading = false);
    }
}

pub struct SessionController {
    store: Arc<dyn KeyValueStore>,
    auth_api: Arc<dyn AuthApi>,
    state: watch::Sender<Session>,
}

impl SessionController {
    /// The session reports loading until `hydrate` has read the persisted state.
    pub fn new(store: Arc<dyn KeyValueStore>, auth_api: Arc<dyn AuthApi>) -> Arc<Self> {
        let (state, _) = watch::channel(Session::pending());
        Arc::new(Self {
            store,
            auth_api,
            state,
        })
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase()
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::for_session(&self.state.borrow())
    }

    /// Sends credentials to the auth endpoint and, on success, establishes the session.
    ///
    /// The server's response is handed back untouched so callers can show its message.
    /// Transport failures come back as a failure response and leave the session as it
    /// was. `Err` means the login succeeded remotely but could not be persisted.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, SessionError> {
        let response = match self.auth_api.login(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(email = %request.email, error = %err, "login request failed");
                return Ok(ApiResponse::Failure {
                    message: Some(err.to_string()),
                    error: Some("transport".into()),
                });
            }
        };

        match &response {
            ApiResponse::Success { data, .. } => {
                self.establish(data.user.clone(), data.token.clone())
                    .await?;
            }
            ApiResponse::Failure { message, .. } => {
                info!(
                    email = %request.email,
                    message = message.as_deref().unwrap_or_default(),
                    "login rejected"
                );
            }
        }
        Ok(response)
    }

    /// Persists `user` and `token`, then marks the session authenticated.
    pub async fn establish(&self, user: User, token: String) -> Result<(), SessionError> {
        let snapshot = serde_json::to_string(&user)?;
        self.store
            .set(keys::ACCESS_TOKEN, &token)
            .await
            .map_err(SessionError::Persist)?;
        if let Err(err) = self.store.set(keys::USER, &snapshot).await {
            if let Err(cleanup) = self.store.remove(keys::ACCESS_TOKEN).await {
                warn!(error = %cleanup, "failed to roll back persisted token");
            }
            return Err(SessionError::Persist(err));
        }

        info!(user_id = user.id.0, role = %user.role, "session established");
        self.state
            .send_modify(|session| *session = Session::authenticated(user, token));
        Ok(())
    }

    /// Drops the session. Memory is always cleared; `Err` reports persisted keys that
    /// could not be removed.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let cleared = self.clear_persisted().await;
        self.state
            .send_modify(|session| *session = Session::unauthenticated());
        info!("session cleared");
        cleared
    }

    /// Rebuilds the session from persisted state, confirming the token remotely only
    /// when no user snapshot is cached.
    pub async fn hydrate(&self) {
        let _loading = LoadingGuard::begin(&self.state);

        let token = match self.store.get(keys::ACCESS_TOKEN).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "failed to read persisted token; starting signed out");
                None
            }
        };
        let Some(token) = token else {
            self.set_signed_out();
            return;
        };

        if let Some(user) = self.cached_user().await {
            info!(user_id = user.id.0, "session restored from cache");
            self.set_signed_in(user, token);
            return;
        }

        match self.auth_api.me(&token).await {
            Ok(ApiResponse::Success { data: user, .. }) => {
                match serde_json::to_string(&user) {
                    Ok(snapshot) => {
                        if let Err(err) = self.store.set(keys::USER, &snapshot).await {
                            warn!(error = %err, "failed to persist user snapshot");
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to encode user snapshot"),
                }
                info!(user_id = user.id.0, "session confirmed remotely");
                self.set_signed_in(user, token);
            }
            Ok(ApiResponse::Failure { message, error }) => {
                warn!(
                    message = message.as_deref().unwrap_or_default(),
                    error = error.as_deref().unwrap_or_default(),
                    "identity check rejected; clearing persisted session"
                );
                self.drop_persisted_session().await;
            }
            Err(err) => {
                let code = err.downcast_ref::<ApiError>().map(|api| api.code);
                if code.is_some_and(|code| code.is_auth_rejection()) {
                    warn!(?code, error = %err, "token rejected; clearing persisted session");
                } else {
                    warn!(
                        ?code,
                        error = %err,
                        "identity check failed; clearing persisted session"
                    );
                }
                self.drop_persisted_session().await;
            }
        }
    }

    async fn cached_user(&self) -> Option<User> {
        let raw = match self.store.get(keys::USER).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "failed to read user snapshot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable user snapshot");
                None
            }
        }
    }

    async fn drop_persisted_session(&self) {
        if let Err(err) = self.clear_persisted().await {
            warn!(error = %err, "failed to clear persisted session");
        }
        self.set_signed_out();
    }

    async fn clear_persisted(&self) -> Result<(), SessionError> {
        let token = self.store.remove(keys::ACCESS_TOKEN).await;
        let user = self.store.remove(keys::USER).await;
        token.and(user).map_err(SessionError::Clear)
    }

    // The two setters below leave `is_loading` to the hydration guard.
    fn set_signed_in(&self, user: User, token: String) {
        self.state.send_modify(|session| {
            session.user = Some(user);
            session.token = Some(token);
        });
    }

    fn set_signed_out(&self) {
        self.state.send_modify(|session| {
            session.user = None;
            session.token = None;
        });
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
