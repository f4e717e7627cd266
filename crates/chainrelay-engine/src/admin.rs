//! One-off engine provisioning

use crate::client::EngineClient;
use crate::error::EngineResult;
use tracing::info;

const MEMORY_GENERATION_MASK: &str = "context_spec.memory_bank_config.generation_config";

pub struct EngineAdmin {
    client: EngineClient,
}

impl EngineAdmin {
    pub fn new(client: EngineClient) -> Self {
        Self { client }
    }

    /// Point the engine's memory bank at `model_path` for fact extraction.
    /// Only needed once per engine.
    pub async fn configure_memory_bank(&self, model_path: &str) -> EngineResult<serde_json::Value> {
        let body = serde_json::json!({
            "contextSpec": {
                "memoryBankConfig": {
                    "generationConfig": { "model": model_path }
                }
            }
        });
        let request = self
            .client
            .http()
            .patch(self.client.engine_url(""))
            .query(&[("updateMask", MEMORY_GENERATION_MASK)])
            .json(&body);
        let op: serde_json::Value = self.client.send(request).await?.json().await?;
        info!("Memory bank generation model set to {}", model_path);
        Ok(op)
    }
}
