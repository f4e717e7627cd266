//! Chat relay - one user message in, one reply and narrative out
//!
//! A turn is handled entirely inside `ChatRelay::handle`: the session handle
//! is locked, the message goes to the runner, the event stream is drained,
//! and the refreshed session is handed to the memory bank. The result is a
//! `TurnOutcome`; text is only produced when it is turned into a
//! `ChatResponse`.

use crate::session::SessionRegistry;
use chainrelay_core::types::replies;
use chainrelay_core::{ChatRequest, ChatResponse, Content, Error, MemoryScope, TraceCollector, TraceEntry, UserId};
use chainrelay_engine::{AgentRunner, MemoryService, Session};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum TurnOutcome {
    /// Startup session never came up; nothing was contacted.
    Initializing,
    Completed {
        reply: Option<String>,
        narrative: Vec<TraceEntry>,
    },
    Failed {
        error: Error,
        narrative: Vec<TraceEntry>,
    },
}

impl TurnOutcome {
    pub fn narrative(&self) -> &[TraceEntry] {
        match self {
            TurnOutcome::Initializing => &[],
            TurnOutcome::Completed { narrative, .. } | TurnOutcome::Failed { narrative, .. } => narrative,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TurnOutcome::Failed { .. })
    }
}

impl From<TurnOutcome> for ChatResponse {
    fn from(outcome: TurnOutcome) -> Self {
        match outcome {
            TurnOutcome::Initializing => ChatResponse {
                reply: replies::INITIALIZING.to_string(),
                narrative: Vec::new(),
            },
            TurnOutcome::Completed { reply, narrative } => ChatResponse {
                reply: reply
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| replies::NO_SUMMARY.to_string()),
                narrative,
            },
            TurnOutcome::Failed { error, narrative } => ChatResponse {
                reply: format!("{}{}", replies::ERROR_PREFIX, error),
                narrative,
            },
        }
    }
}

pub struct ChatRelay {
    runner: Arc<dyn AgentRunner>,
    sessions: Arc<SessionRegistry>,
    memory: Option<Arc<dyn MemoryService>>,
}

impl ChatRelay {
    pub fn new(runner: Arc<dyn AgentRunner>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            runner,
            sessions,
            memory: None,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.sessions.is_ready()
    }

    pub async fn handle(&self, request: ChatRequest) -> TurnOutcome {
        if !self.sessions.is_ready() {
            debug!("Chat received before session initialization");
            return TurnOutcome::Initializing;
        }

        let user = request
            .user_id
            .filter(|u| !u.trim().is_empty())
            .map(UserId::from)
            .unwrap_or_else(|| self.sessions.default_user().clone());

        let handle = match self.sessions.resolve(&user).await {
            Ok(h) => h,
            Err(error) => {
                error!("No session for user {}: {}", user, error);
                return TurnOutcome::Failed {
                    error,
                    narrative: Vec::new(),
                };
            }
        };
        let mut session = handle.lock().await;
        info!("Session ID: {}", session.id);

        self.log_memories(&user).await;

        let mut trace = TraceCollector::new();
        trace.begin_turn();

        let reply = match self.drive(&user, &session.id, &request.message, &mut trace).await {
            Ok(reply) => reply,
            Err(error) => {
                error!("Error during runner stream: {}", error);
                return TurnOutcome::Failed {
                    error,
                    narrative: trace.into_entries(),
                };
            }
        };

        if let Some(refreshed) = self.refresh(&session).await {
            *session = refreshed;
            self.persist(&session).await;
        }

        TurnOutcome::Completed {
            reply,
            narrative: trace.into_entries(),
        }
    }

    /// Send the message and drain the runner's events. Returns the last
    /// non-empty text fragment seen.
    async fn drive(
        &self,
        user: &UserId,
        session_id: &str,
        message: &str,
        trace: &mut TraceCollector,
    ) -> Result<Option<String>, Error> {
        let mut stream = self
            .runner
            .run(user.as_str(), session_id, Content::user(message))
            .await
            .map_err(|e| e.into_runner_error())?;

        let mut final_text: Option<String> = None;
        while let Some(item) = stream.next().await {
            let event = item.map_err(|e| e.into_runner_error())?;
            if let Some(author) = event.author() {
                if trace.record(author) {
                    debug!("Agent {} joined the turn", author);
                }
            }
            if let Some(text) = event.text() {
                final_text = Some(text.to_string());
            }
        }
        Ok(final_text)
    }

    /// Re-read the session so runtime-side updates are cached. Failures keep
    /// the cached copy.
    async fn refresh(&self, current: &Session) -> Option<Session> {
        let service = self.sessions.service();
        match service
            .get_session(&current.app_name, &current.user_id, &current.id)
            .await
        {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                warn!("Session {} vanished on refresh; keeping cached copy", current.id);
                None
            }
            Err(e) => {
                warn!("Session {} refresh failed: {}", current.id, e);
                None
            }
        }
    }

    async fn persist(&self, session: &Session) {
        let Some(memory) = &self.memory else { return };
        match memory.add_session_to_memory(session).await {
            Ok(()) => info!("Session {} added to memory", session.id),
            Err(e) => error!("Error adding session to memory: {}", e),
        }
    }

    async fn log_memories(&self, user: &UserId) {
        let Some(memory) = &self.memory else { return };
        let scope = MemoryScope::new(self.sessions.app_name(), user.as_str());
        match memory.retrieve(&scope).await {
            Ok(memories) => debug!("{} memories on record for {}", memories.len(), user),
            Err(e) => debug!("Memory retrieval for {} failed: {}", user, e),
        }
    }
}
