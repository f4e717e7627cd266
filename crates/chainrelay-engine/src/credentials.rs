//! Bearer tokens for the cloud REST APIs

use crate::error::{EngineError, EngineResult};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the metadata server says the token expires.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

enum Source {
    /// No Authorization header (local emulators, tests).
    Anonymous,
    Static(String),
    Metadata {
        url: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

pub struct TokenSource {
    http: reqwest::Client,
    source: Source,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

impl TokenSource {
    pub fn anonymous() -> Self {
        Self {
            http: reqwest::Client::new(),
            source: Source::Anonymous,
        }
    }

    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            source: Source::Static(token.into()),
        }
    }

    pub fn metadata_server() -> Self {
        Self::metadata_at(METADATA_TOKEN_URL)
    }

    pub fn metadata_at(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            source: Source::Metadata {
                url: url.into(),
                cache: Mutex::new(None),
            },
        }
    }

    /// Static token when one is configured, otherwise the metadata server.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some(t) => Self::fixed(t),
            None => Self::metadata_server(),
        }
    }

    pub async fn token(&self) -> EngineResult<Option<String>> {
        match &self.source {
            Source::Anonymous => Ok(None),
            Source::Static(token) => Ok(Some(token.clone())),
            Source::Metadata { url, cache } => {
                let mut cached = cache.lock().await;
                if let Some(c) = cached.as_ref() {
                    if Instant::now() < c.expires_at {
                        return Ok(Some(c.token.clone()));
                    }
                }

                let response = self
                    .http
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| EngineError::Credentials(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(EngineError::Credentials(format!(
                        "metadata server returned {}",
                        response.status()
                    )));
                }
                let fresh: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| EngineError::Credentials(e.to_string()))?;

                debug!("Fetched access token (expires in {}s)", fresh.expires_in);
                let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_SLACK);
                *cached = Some(CachedToken {
                    token: fresh.access_token.clone(),
                    expires_at: Instant::now() + lifetime,
                });
                Ok(Some(fresh.access_token))
            }
        }
    }
}
