//! Session ownership, keyed by user.
//!
//! The default user's session is created once at startup; its absence is
//! what puts the relay in the "initializing" state. Other users get a
//! session on first use. Each handle sits behind an async mutex that the
//! relay holds for a whole turn, so turns on one session never interleave.

use chainrelay_core::{Error, Result, UserId};
use chainrelay_engine::{Session, SessionService};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

pub type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionRegistry {
    service: Arc<dyn SessionService>,
    app_name: String,
    default_user: UserId,
    sessions: DashMap<UserId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new(service: Arc<dyn SessionService>, app_name: impl Into<String>, default_user: impl Into<UserId>) -> Self {
        Self {
            service,
            app_name: app_name.into(),
            default_user: default_user.into(),
            sessions: DashMap::new(),
        }
    }

    /// Create the default user's session. On failure the registry stays
    /// not-ready for the life of the process.
    pub async fn initialize(&self) -> bool {
        match self.service.create_session(&self.app_name, self.default_user.as_str()).await {
            Ok(session) => {
                info!("Session {} created successfully.", session.id);
                self.sessions
                    .insert(self.default_user.clone(), Arc::new(Mutex::new(session)));
                true
            }
            Err(e) => {
                error!("Error creating session: {}", e);
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.sessions.contains_key(&self.default_user)
    }

    pub fn default_user(&self) -> &UserId {
        &self.default_user
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn service(&self) -> &Arc<dyn SessionService> {
        &self.service
    }

    pub fn get(&self, user: &UserId) -> Option<SessionHandle> {
        self.sessions.get(user).map(|s| s.clone())
    }

    /// Session for `user`, creating one through the session service when the
    /// user has none yet.
    pub async fn resolve(&self, user: &UserId) -> Result<SessionHandle> {
        if let Some(handle) = self.get(user) {
            return Ok(handle);
        }
        if user == &self.default_user {
            return Err(Error::SessionError("default session not initialized".into()));
        }

        let session = self
            .service
            .create_session(&self.app_name, user.as_str())
            .await
            .map_err(|e| e.into_session_error())?;
        info!("Session {} created for user {}", session.id, user);

        // A concurrent first request may have won; keep whichever landed first.
        Ok(self
            .sessions
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
