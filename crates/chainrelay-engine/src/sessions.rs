//! Session store adapters
//!
//! The session service owns conversation history; the relay only creates a
//! session, then re-reads it after every turn.

use crate::client::EngineClient;
use crate::error::{EngineError, EngineResult};
use chainrelay_core::Content;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const OPERATION_POLL_ATTEMPTS: usize = 10;
const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub invocation_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SessionEvent {
    pub fn new(author: impl Into<String>, content: Content) -> Self {
        Self {
            author: Some(author.into()),
            content: Some(content),
            invocation_id: None,
            timestamp: Some(Utc::now()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub events: Vec<SessionEvent>,
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: impl Into<String>, app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: serde_json::Map::new(),
            events: Vec::new(),
            last_update_time: Some(Utc::now()),
        }
    }
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    async fn create_session(&self, app_name: &str, user_id: &str) -> EngineResult<Session>;

    /// `None` when the session does not exist or belongs to another user.
    async fn get_session(&self, app_name: &str, user_id: &str, session_id: &str) -> EngineResult<Option<Session>>;
}

// ---------------------------------------------------------------------------
// Managed session service
// ---------------------------------------------------------------------------

pub struct VertexSessionService {
    client: EngineClient,
    poll_interval: Duration,
}

impl VertexSessionService {
    pub fn new(client: EngineClient) -> Self {
        Self {
            client,
            poll_interval: OPERATION_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn wait_for_operation(&self, op: Operation) -> EngineResult<()> {
        if op.done {
            return op.into_result();
        }
        for attempt in 1..=OPERATION_POLL_ATTEMPTS {
            tokio::time::sleep(self.poll_interval).await;
            let request = self.client.http().get(self.client.resource_url(&op.name));
            let polled: Operation = self.client.send(request).await?.json().await?;
            if polled.done {
                debug!("Operation {} done after {} polls", op.name, attempt);
                return polled.into_result();
            }
        }
        Err(EngineError::RequestFailed(format!(
            "operation {} did not finish after {} polls",
            op.name, OPERATION_POLL_ATTEMPTS
        )))
    }

    async fn list_events(&self, session_id: &str) -> EngineResult<Vec<SessionEvent>> {
        let url = self.client.engine_url(&format!("/sessions/{}/events", session_id));
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.http().get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: EventsPage = self.client.send(request).await?.json().await?;
            events.extend(page.session_events);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(events)
    }
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl Operation {
    fn into_result(self) -> EngineResult<()> {
        match self.error {
            Some(err) => Err(EngineError::remote(err.code.to_string(), err.message)),
            None => Ok(()),
        }
    }

    /// `.../sessions/{id}/operations/{op}` -> `{id}`
    fn session_id(&self) -> Option<String> {
        let rest = self.name.split("/sessions/").nth(1)?;
        let id = rest.split('/').next()?;
        (!id.is_empty()).then(|| id.to_string())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSession {
    name: String,
    user_id: String,
    #[serde(default)]
    session_state: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    update_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    session_events: Vec<SessionEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait::async_trait]
impl SessionService for VertexSessionService {
    async fn create_session(&self, app_name: &str, user_id: &str) -> EngineResult<Session> {
        let request = self
            .client
            .http()
            .post(self.client.engine_url("/sessions"))
            .json(&serde_json::json!({ "userId": user_id }));
        let op: Operation = self.client.send(request).await?.json().await?;

        let session_id = op
            .session_id()
            .ok_or_else(|| EngineError::InvalidResponse(format!("no session id in operation {}", op.name)))?;
        self.wait_for_operation(op).await?;

        let session = self
            .get_session(app_name, user_id, &session_id)
            .await?
            .ok_or_else(|| EngineError::InvalidResponse(format!("session {} missing after creation", session_id)))?;
        info!("Session {} created for user {}", session.id, user_id);
        Ok(session)
    }

    async fn get_session(&self, app_name: &str, user_id: &str, session_id: &str) -> EngineResult<Option<Session>> {
        let request = self
            .client
            .http()
            .get(self.client.engine_url(&format!("/sessions/{}", session_id)));
        let remote: RemoteSession = match self.client.send(request).await {
            Ok(resp) => resp.json().await?,
            Err(EngineError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if remote.user_id != user_id {
            warn!("Session {} belongs to {}, not {}", remote.name, remote.user_id, user_id);
            return Ok(None);
        }

        let events = self.list_events(session_id).await?;
        Ok(Some(Session {
            id: session_id.to_string(),
            app_name: app_name.to_string(),
            user_id: remote.user_id,
            state: remote.session_state.unwrap_or_default(),
            events,
            last_update_time: remote.update_time,
        }))
    }
}

// ---------------------------------------------------------------------------
// In-process session service
// ---------------------------------------------------------------------------

/// Sessions held in process memory. The managed runner cannot see these,
/// so they back tests and embedders that bring their own `AgentRunner`.
#[derive(Default)]
pub struct InMemorySessionService {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event as the runtime would after a turn.
    pub fn append_event(&self, session_id: &str, event: SessionEvent) -> EngineResult<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::NotFound(format!("session {}", session_id)))?;
        session.events.push(event);
        session.last_update_time = Some(Utc::now());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(&self, app_name: &str, user_id: &str) -> EngineResult<Session> {
        let session = Session::new(uuid::Uuid::new_v4().to_string(), app_name, user_id);
        self.sessions.insert(session.id.clone(), session.clone());
        debug!("In-memory session {} created for {}", session.id, user_id);
        Ok(session)
    }

    async fn get_session(&self, app_name: &str, user_id: &str, session_id: &str) -> EngineResult<Option<Session>> {
        Ok(self
            .sessions
            .get(session_id)
            .filter(|s| s.app_name == app_name && s.user_id == user_id)
            .map(|s| s.clone()))
    }
}
