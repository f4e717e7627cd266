//! Orchestration narrative - which agents took part in a single turn.
//!
//! A `TraceCollector` is created per request and threaded through the turn,
//! so concurrent requests never see each other's entries.

use serde::{Deserialize, Serialize};

pub const SYSTEM_AGENT: &str = "System";
pub const SEED_ACTION: &str = "Establishing session context...";
pub const AGENT_ACTION: &str = "Analyzing data requirements...";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    #[default]
    OrchestrationEvent,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceEntry {
    pub agent: String,
    pub action: String,
    #[serde(rename = "type", default)]
    pub kind: TraceKind,
}

impl TraceEntry {
    pub fn new(agent: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            action: action.into(),
            kind: TraceKind::OrchestrationEvent,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TraceCollector {
    entries: Vec<TraceEntry>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Reset for a new turn and add the system seed entry.
    pub fn begin_turn(&mut self) {
        self.clear();
        self.entries.push(TraceEntry::new(SYSTEM_AGENT, SEED_ACTION));
    }

    /// Append an entry for `agent` unless one already names it.
    /// Returns true when an entry was appended.
    pub fn record(&mut self, agent: &str) -> bool {
        if agent.is_empty() || self.contains(agent) {
            return false;
        }
        self.entries.push(TraceEntry::new(agent, AGENT_ACTION));
        true
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.entries.iter().any(|e| e.agent == agent)
    }

    pub fn snapshot(&self) -> Vec<TraceEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}
