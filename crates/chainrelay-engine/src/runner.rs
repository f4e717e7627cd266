//! Runner - executes the deployed agent tree against a session

use crate::client::EngineClient;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventSchema, RunnerEvent};
use chainrelay_core::{AgentDefinition, Content};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::pin::Pin;
use tracing::debug;

/// Stream of events for one turn
pub type RunnerStream = Pin<Box<dyn Stream<Item = EngineResult<RunnerEvent>> + Send>>;

#[async_trait::async_trait]
pub trait AgentRunner: Send + Sync {
    fn name(&self) -> &str;

    /// Submit `message` to the session and stream the runtime's events back.
    async fn run(&self, user_id: &str, session_id: &str, message: Content) -> EngineResult<RunnerStream>;
}

/// Runner backed by the managed engine's `:streamQuery` endpoint.
pub struct AgentEngineRunner {
    client: EngineClient,
    schema: EventSchema,
    known_agents: HashSet<String>,
}

impl AgentEngineRunner {
    pub fn new(client: EngineClient) -> Self {
        Self {
            client,
            schema: EventSchema::default(),
            known_agents: HashSet::new(),
        }
    }

    /// Register the deployed tree so unexpected authors get logged.
    pub fn with_agents(mut self, root: &AgentDefinition) -> Self {
        self.known_agents = root.names().into_iter().map(String::from).collect();
        self
    }
}

#[derive(Serialize)]
struct StreamQueryRequest<'a> {
    class_method: &'static str,
    input: StreamQueryInput<'a>,
}

#[derive(Serialize)]
struct StreamQueryInput<'a> {
    user_id: &'a str,
    session_id: &'a str,
    message: Content,
}

#[async_trait::async_trait]
impl AgentRunner for AgentEngineRunner {
    fn name(&self) -> &str {
        "agent-engine"
    }

    async fn run(&self, user_id: &str, session_id: &str, message: Content) -> EngineResult<RunnerStream> {
        let body = StreamQueryRequest {
            class_method: "async_stream_query",
            input: StreamQueryInput {
                user_id,
                session_id,
                message,
            },
        };

        debug!("streamQuery: engine={} session={}", self.client.engine_resource(), session_id);

        let request = self.client.http().post(self.client.engine_url(":streamQuery")).json(&body);
        let response = self.client.send(request).await?;

        let known = self.known_agents.clone();
        let stream = parse_event_stream(response.bytes_stream(), self.schema).inspect(move |item| {
            if let Ok(event) = item {
                if let Some(author) = event.author() {
                    if !known.is_empty() && author != "user" && !known.contains(author) {
                        debug!("Event from unregistered agent: {}", author);
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

/// Split a byte stream into lines and decode each as a runner event.
/// Stops after the first transport error.
pub fn parse_event_stream<E>(
    bytes_stream: impl Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    schema: EventSchema,
) -> impl Stream<Item = EngineResult<RunnerEvent>> + Send
where
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();

        tokio::pin!(bytes_stream);

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(EngineError::StreamError(e.to_string()));
                    return;
                }
            };

            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                match schema.decode_line(&line) {
                    Ok(Some(event)) => yield Ok(event),
                    Ok(None) => {}
                    Err(e) => yield Err(e),
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer);
            match schema.decode_line(&line) {
                Ok(Some(event)) => yield Ok(event),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        }
    }
}
