//! Core types for Chainrelay

use crate::narrative::TraceEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// User identifier - cheaply cloneable, keys the session registry
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct UserId(Arc<str>);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Content role in the runtime's message envelope
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    #[serde(other)]
    Other,
}

/// A single part of a content envelope
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Structured content envelope sent to the runner
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::User),
            parts: vec![Part::text(text)],
        }
    }

    /// Last non-empty text part, if any.
    pub fn last_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .rev()
            .filter_map(|p| p.text.as_deref())
            .find(|t| !t.is_empty())
    }
}

/// Body of `POST /chat`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Response of `POST /chat`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub reply: String,
    pub narrative: Vec<TraceEntry>,
}

/// Fixed replies rendered at the response boundary.
pub mod replies {
    pub const INITIALIZING: &str =
        "The system is initializing. Please wait and try again in a moment.";
    pub const NO_SUMMARY: &str =
        "The orchestrator completed the workflow but did not return a final summary.";
    pub const ERROR_PREFIX: &str = "System Error: ";
}

/// Scope under which memories are generated and retrieved
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryScope {
    pub app_name: String,
    pub user_id: String,
}

impl MemoryScope {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
        }
    }
}
