//! Runner event contract.
//!
//! The engine streams one JSON object per line. Each event may carry the
//! name of the agent that produced it and text in one of two places: a
//! top-level `text` field or `content.parts[].text`. The precedence between
//! them is fixed per schema version instead of being guessed per event.

use crate::error::{EngineError, EngineResult};
use chainrelay_core::Content;
use serde::Deserialize;

/// Event schema versions understood by the relay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventSchema {
    /// Agent Development Kit event dump: `author`, `content.parts`,
    /// optional `text`, `partial`, `error_code`/`error_message`.
    #[default]
    AdkV1,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RunnerEvent {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub partial: Option<bool>,
    #[serde(default, alias = "invocationId")]
    pub invocation_id: Option<String>,
    #[serde(default, alias = "errorCode")]
    pub error_code: Option<String>,
    #[serde(default, alias = "errorMessage")]
    pub error_message: Option<String>,
}

impl RunnerEvent {
    pub fn from_author(author: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Originating agent, if non-empty.
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref().filter(|a| !a.is_empty())
    }

    /// Reply text carried by this event. A non-empty top-level `text` wins;
    /// otherwise the last non-empty part.
    pub fn text(&self) -> Option<&str> {
        if let Some(t) = self.text.as_deref().filter(|t| !t.is_empty()) {
            return Some(t);
        }
        self.content.as_ref().and_then(|c| c.last_text())
    }

    fn remote_error(&self) -> Option<EngineError> {
        if self.error_code.is_none() && self.error_message.is_none() {
            return None;
        }
        Some(EngineError::remote(
            self.error_code.clone().unwrap_or_else(|| "UNKNOWN".into()),
            self.error_message.clone().unwrap_or_default(),
        ))
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    message: String,
}

impl EventSchema {
    /// Decode one line of the stream. Blank lines and `[DONE]` markers yield
    /// `None`; an optional SSE `data:` prefix is stripped.
    pub fn decode_line(&self, line: &str) -> EngineResult<Option<RunnerEvent>> {
        let line = line.trim();
        let line = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
        if line.is_empty() || line == "[DONE]" {
            return Ok(None);
        }

        match self {
            EventSchema::AdkV1 => {
                let value: serde_json::Value = serde_json::from_str(line)
                    .map_err(|e| EngineError::StreamError(format!("undecodable event: {}", e)))?;

                if value.get("error").map_or(false, |e| e.is_object()) {
                    let envelope: ErrorEnvelope = serde_json::from_value(value)?;
                    let code = match envelope.error.code {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => "UNKNOWN".to_string(),
                        other => other.to_string(),
                    };
                    return Err(EngineError::remote(code, envelope.error.message));
                }

                let event: RunnerEvent = serde_json::from_value(value)
                    .map_err(|e| EngineError::StreamError(format!("unexpected event shape: {}", e)))?;
                match event.remote_error() {
                    Some(err) => Err(err),
                    None => Ok(Some(event)),
                }
            }
        }
    }
}
