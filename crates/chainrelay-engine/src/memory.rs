//! Memory bank adapters
//!
//! After a turn the relay hands the refreshed session to the memory service,
//! which extracts long-term facts. Retrieval at turn time is done by the
//! runtime itself; `retrieve` exists for diagnostics.

use crate::client::EngineClient;
use crate::error::EngineResult;
use crate::sessions::Session;
use chainrelay_core::MemoryScope;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub fact: String,
}

#[async_trait::async_trait]
pub trait MemoryService: Send + Sync {
    async fn add_session_to_memory(&self, session: &Session) -> EngineResult<()>;

    async fn retrieve(&self, scope: &MemoryScope) -> EngineResult<Vec<MemoryRecord>>;
}

// ---------------------------------------------------------------------------
// Managed memory bank
// ---------------------------------------------------------------------------

pub struct VertexMemoryBankService {
    client: EngineClient,
}

impl VertexMemoryBankService {
    pub fn new(client: EngineClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrievePage {
    #[serde(default)]
    retrieved_memories: Vec<RetrievedMemory>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RetrievedMemory {
    memory: MemoryRecord,
}

#[async_trait::async_trait]
impl MemoryService for VertexMemoryBankService {
    async fn add_session_to_memory(&self, session: &Session) -> EngineResult<()> {
        let session_name = format!("{}/sessions/{}", self.client.engine_resource(), session.id);
        let body = serde_json::json!({
            "vertexSessionSource": { "session": session_name },
            "scope": MemoryScope::new(&session.app_name, &session.user_id),
        });
        let request = self
            .client
            .http()
            .post(self.client.engine_url("/memories:generate"))
            .json(&body);
        self.client.send(request).await?;
        debug!("Memory generation requested for session {}", session.id);
        Ok(())
    }

    async fn retrieve(&self, scope: &MemoryScope) -> EngineResult<Vec<MemoryRecord>> {
        let url = self.client.engine_url("/memories:retrieve");
        let mut memories = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut body = serde_json::json!({
                "scope": scope,
                "simpleRetrievalParams": {},
            });
            if let Some(token) = &page_token {
                body["simpleRetrievalParams"]["pageToken"] = serde_json::json!(token);
            }
            let request = self.client.http().post(&url).json(&body);
            let page: RetrievePage = self.client.send(request).await?.json().await?;
            memories.extend(page.retrieved_memories.into_iter().map(|r| r.memory));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(memories)
    }
}

// ---------------------------------------------------------------------------
// In-process memory
// ---------------------------------------------------------------------------

/// Keeps every text part of saved sessions as a fact, keyed by scope.
#[derive(Default)]
pub struct InMemoryMemoryService {
    facts: DashMap<(String, String), Vec<MemoryRecord>>,
}

impl InMemoryMemoryService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn add_session_to_memory(&self, session: &Session) -> EngineResult<()> {
        let facts: Vec<MemoryRecord> = session
            .events
            .iter()
            .filter_map(|e| e.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.clone())
            .filter(|t| !t.is_empty())
            .map(|fact| MemoryRecord { name: None, fact })
            .collect();

        let key = (session.app_name.clone(), session.user_id.clone());
        let mut entry = self.facts.entry(key).or_default();
        for fact in facts {
            if !entry.contains(&fact) {
                entry.push(fact);
            }
        }
        Ok(())
    }

    async fn retrieve(&self, scope: &MemoryScope) -> EngineResult<Vec<MemoryRecord>> {
        let key = (scope.app_name.clone(), scope.user_id.clone());
        Ok(self.facts.get(&key).map(|f| f.clone()).unwrap_or_default())
    }
}
