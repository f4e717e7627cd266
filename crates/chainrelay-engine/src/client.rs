//! Shared HTTP client for the agent engine resource

use crate::credentials::TokenSource;
use crate::error::{EngineError, EngineResult};
use chainrelay_core::RelayConfig;
use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct EngineClient {
    http: Client,
    api_base: String,
    engine: String,
    tokens: Arc<TokenSource>,
}

impl EngineClient {
    pub fn new(api_base: impl Into<String>, engine_resource: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            engine: engine_resource.into(),
            tokens: Arc::new(tokens),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.api_base(),
            config.engine_resource(),
            TokenSource::from_token(config.access_token.as_deref()),
        )
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// `projects/{p}/locations/{l}/reasoningEngines/{id}`
    pub fn engine_resource(&self) -> &str {
        &self.engine
    }

    /// URL of the engine resource with `suffix` appended (`/sessions`, `:streamQuery`, ...).
    pub fn engine_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.api_base, self.engine, suffix)
    }

    /// URL of an arbitrary resource name under the API base.
    pub fn resource_url(&self, name: &str) -> String {
        format!("{}/{}", self.api_base, name.trim_start_matches('/'))
    }

    /// Attach credentials, send, and map non-2xx statuses to typed errors.
    pub async fn send(&self, builder: RequestBuilder) -> EngineResult<Response> {
        let builder = match self.tokens.token().await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let response = builder.send().await?;
        check_status(response).await
    }
}

pub(crate) async fn check_status(response: Response) -> EngineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let error_text = response.text().await.unwrap_or_default();
    error!("Engine error {} from {}: {}", status, url, error_text);

    Err(match status.as_u16() {
        401 | 403 => EngineError::AuthFailed(error_text),
        404 => EngineError::NotFound(url),
        429 => EngineError::RateLimited { retry_after_ms: 60000 },
        _ => EngineError::RequestFailed(format!("{}: {}", status, error_text)),
    })
}
