//! Relay configuration - read from the process environment.
//!
//! Every value is passed straight through to the external service clients.
//! `from_lookup` takes any variable source so tests don't touch the real
//! environment.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_USER_ID: &str = "default_user";

pub const ENV_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_LOCATION: &str = "GOOGLE_CLOUD_LOCATION";
pub const ENV_USE_VERTEXAI: &str = "GOOGLE_GENAI_USE_VERTEXAI";
pub const ENV_TOOLBOX_SERVER: &str = "TOOLBOX_SERVER";
pub const ENV_TOOLBOX_TOOLSET: &str = "TOOLBOX_TOOLSET";
pub const ENV_APP_NAME: &str = "REASONING_ENGINE_APP_NAME";
pub const ENV_AGENT_ENGINE_ID: &str = "AGENT_ENGINE_ID";
pub const ENV_PORT: &str = "PORT";
pub const ENV_API_BASE: &str = "CHAINRELAY_API_BASE";
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Which generative backend the deployed agents talk to.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    VertexAi,
    GeminiApi,
}

impl Backend {
    pub fn parse(flag: &str) -> Self {
        match flag.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Backend::VertexAi,
            _ => Backend::GeminiApi,
        }
    }

    /// `GOOGLE_GENAI_USE_VERTEXAI` as the deployed agents expect it.
    pub fn as_flag(&self) -> &'static str {
        match self {
            Backend::VertexAi => "TRUE",
            Backend::GeminiApi => "FALSE",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub project: String,
    pub location: String,
    pub backend: Backend,
    pub toolbox_server: String,
    pub toolbox_toolset: String,
    pub app_name: String,
    pub agent_engine_id: String,
    pub default_user: String,
    pub port: u16,
    pub api_base: Option<String>,
    pub access_token: Option<String>,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::missing_var(key))
        };

        let port = match lookup(ENV_PORT) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::ConfigError(format!("{} must be a port number, got {:?}", ENV_PORT, raw)))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            project: required(ENV_PROJECT)?,
            location: required(ENV_LOCATION)?,
            backend: Backend::parse(&required(ENV_USE_VERTEXAI)?),
            toolbox_server: required(ENV_TOOLBOX_SERVER)?,
            toolbox_toolset: required(ENV_TOOLBOX_TOOLSET)?,
            app_name: required(ENV_APP_NAME)?,
            agent_engine_id: required(ENV_AGENT_ENGINE_ID)?,
            default_user: DEFAULT_USER_ID.to_string(),
            port,
            api_base: lookup(ENV_API_BASE).filter(|v| !v.is_empty()),
            access_token: lookup(ENV_ACCESS_TOKEN).filter(|v| !v.is_empty()),
        })
    }

    /// REST base, e.g. `https://us-central1-aiplatform.googleapis.com/v1beta1`.
    pub fn api_base(&self) -> String {
        match &self.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com/v1beta1", self.location),
        }
    }

    /// Full resource name of the agent engine. Accepts either a bare id or
    /// an already-qualified `projects/...` name in `AGENT_ENGINE_ID`.
    pub fn engine_resource(&self) -> String {
        if self.agent_engine_id.starts_with("projects/") {
            self.agent_engine_id.clone()
        } else {
            format!(
                "projects/{}/locations/{}/reasoningEngines/{}",
                self.project, self.location, self.agent_engine_id
            )
        }
    }

    /// Environment the deployed agent tree runs with.
    pub fn agent_env(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (ENV_PROJECT, self.project.clone()),
            (ENV_LOCATION, self.location.clone()),
            (ENV_USE_VERTEXAI, self.backend.as_flag().to_string()),
            (ENV_TOOLBOX_SERVER, self.toolbox_server.clone()),
            (ENV_TOOLBOX_TOOLSET, self.toolbox_toolset.clone()),
        ])
    }

    /// Publisher path for a Gemini model in this project/region.
    pub fn publisher_model(&self, model: &str) -> String {
        format!(
            "projects/{}/locations/{}/publishers/google/models/{}",
            self.project, self.location, model
        )
    }
}
