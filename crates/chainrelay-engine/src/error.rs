//! Engine error types

use chainrelay_core::Error as CoreError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl EngineError {
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Map into the relay-level error for the given concern.
    pub fn into_session_error(self) -> CoreError {
        CoreError::SessionError(self.to_string())
    }

    pub fn into_runner_error(self) -> CoreError {
        CoreError::RunnerError(self.to_string())
    }
}
