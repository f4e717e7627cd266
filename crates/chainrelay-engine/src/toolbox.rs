//! Tool catalog client - loads a named toolset from the toolbox server

use crate::client::check_status;
use crate::error::EngineResult;
use chainrelay_core::{ToolBinding, ToolParameter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

pub struct ToolboxClient {
    http: Client,
    server: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolsetManifest {
    #[serde(default)]
    server_version: Option<String>,
    #[serde(default)]
    tools: BTreeMap<String, ToolManifest>,
}

#[derive(Deserialize)]
struct ToolManifest {
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Vec<ToolParameter>,
}

impl ToolboxClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server: server.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch `toolset` and return its tools sorted by name.
    pub async fn load_toolset(&self, toolset: &str) -> EngineResult<Vec<ToolBinding>> {
        let url = format!("{}/api/toolset/{}", self.server, toolset);
        let response = check_status(self.http.get(&url).send().await?).await?;
        let manifest: ToolsetManifest = response.json().await?;

        let tools: Vec<ToolBinding> = manifest
            .tools
            .into_iter()
            .map(|(name, tool)| ToolBinding {
                name,
                description: tool.description,
                parameters: tool.parameters,
            })
            .collect();

        info!(
            "Loaded toolset {} ({} tools, server {})",
            toolset,
            tools.len(),
            manifest.server_version.as_deref().unwrap_or("unknown")
        );
        Ok(tools)
    }
}
