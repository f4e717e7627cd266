//! Gateway server: chat UI, chat endpoint, and health

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chainrelay_agent::{ChatRelay, SessionRegistry, TurnOutcome};
use chainrelay_core::agents::{supply_chain_tree, DEFAULT_MODEL};
use chainrelay_core::{AgentDefinition, ChatRequest, ChatResponse, Error, RelayConfig};
use chainrelay_engine::{
    AgentEngineRunner, EngineClient, ToolboxClient, VertexMemoryBankService, VertexSessionService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

pub struct AppState {
    pub relay: Arc<ChatRelay>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(relay: Arc<ChatRelay>) -> Self {
        Self {
            relay,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Load the toolset, define the agent tree, wire the engine adapters, and
/// create the startup session. Only toolbox and agent-tree problems are
/// fatal; a failed session leaves the relay in the initializing state.
pub async fn build_relay(config: &RelayConfig) -> anyhow::Result<(Arc<ChatRelay>, AgentDefinition)> {
    let tools = ToolboxClient::new(&config.toolbox_server)
        .load_toolset(&config.toolbox_toolset)
        .await
        .map_err(|e| Error::toolbox_error(&config.toolbox_toolset, e.to_string()))
        .context("loading toolset")?;

    let agents = supply_chain_tree(DEFAULT_MODEL, &tools);
    agents.validate()?;
    info!("Agents: {:?}", agents.names());

    let client = EngineClient::from_config(config);
    let runner = AgentEngineRunner::new(client.clone()).with_agents(&agents);
    let sessions = Arc::new(SessionRegistry::new(
        Arc::new(VertexSessionService::new(client.clone())),
        &config.app_name,
        config.default_user.as_str(),
    ));
    let memory = VertexMemoryBankService::new(client);

    if !sessions.initialize().await {
        warn!("Startup session unavailable; chat will report initializing");
    }

    let relay = ChatRelay::new(Arc::new(runner), sessions).with_memory(Arc::new(memory));
    Ok((Arc::new(relay), agents))
}

pub async fn start_gateway(config: RelayConfig) -> anyhow::Result<()> {
    let (relay, _agents) = build_relay(&config).await?;
    let state = Arc::new(AppState::new(relay));
    let app = router(state);

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Chainrelay Gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Engine:       {}", config.engine_resource());
    info!("  App name:     {}", config.app_name);
    info!("  Toolset:      {} @ {}", config.toolbox_toolset, config.toolbox_server);
    info!("  Backend:      {:?}", config.backend);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Always answers 200; failures travel in `reply`. Before the startup
/// session exists the body is not decoded at all.
async fn chat_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Json<ChatResponse> {
    if !state.relay.is_ready() {
        return Json(ChatResponse::from(TurnOutcome::Initializing));
    }
    let outcome = match serde_json::from_slice::<ChatRequest>(&body) {
        Ok(request) => state.relay.handle(request).await,
        Err(e) => {
            warn!("Rejected chat body: {}", e);
            TurnOutcome::Failed {
                error: Error::JsonError(e),
                narrative: Vec::new(),
            }
        }
    };
    Json(ChatResponse::from(outcome))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "ready": state.relay.is_ready(),
        "memory": state.relay.has_memory(),
        "sessions": state.relay.sessions().len(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
