//! Error types for Chainrelay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("session error: {0}")]
    SessionError(String),

    #[error("runner error: {0}")]
    RunnerError(String),

    #[error("memory error: {0}")]
    MemoryError(String),

    #[error("toolbox error: {toolset} - {message}")]
    ToolboxError { toolset: String, message: String },

    #[error("credentials error: {0}")]
    CredentialsError(String),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn missing_var(name: &str) -> Self {
        Self::ConfigError(format!("{} is not set", name))
    }

    pub fn toolbox_error(toolset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolboxError {
            toolset: toolset.into(),
            message: message.into(),
        }
    }
}
