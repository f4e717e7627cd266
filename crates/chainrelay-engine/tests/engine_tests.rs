//! Tests for chainrelay-engine: event contract, stream decoding, and the REST
//! adapters against a local mock of the engine API

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use chainrelay_core::{Content, MemoryScope, Part, Role};
use chainrelay_engine::runner::parse_event_stream;
use chainrelay_engine::*;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ENGINE: &str = "projects/acme/locations/us-central1/reasoningEngines/77";

// ===========================================================================
// Mock engine server
// ===========================================================================

#[derive(Clone, Debug)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    auth: Option<String>,
    body: serde_json::Value,
}

type Responder = Arc<dyn Fn(&Method, &str, Option<&str>) -> (StatusCode, String) + Send + Sync>;

#[derive(Clone)]
struct MockState {
    responder: Responder,
    log: Arc<Mutex<Vec<Recorded>>>,
}

async fn mock_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    state.log.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(String::from),
        auth,
        body,
    });
    let (status, text) = (state.responder)(&method, uri.path(), uri.query());
    (status, text)
}

struct MockEngine {
    base: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockEngine {
    async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Method, &str, Option<&str>) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            responder: Arc::new(responder),
            log: log.clone(),
        };
        let app = Router::new().fallback(mock_handler).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{}", addr),
            log,
        }
    }

    fn client(&self) -> EngineClient {
        EngineClient::new(format!("{}/v1beta1", self.base), ENGINE, TokenSource::fixed("test-token"))
    }

    fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }
}

fn engine_path(suffix: &str) -> String {
    format!("/v1beta1/{}{}", ENGINE, suffix)
}

fn ok(body: serde_json::Value) -> (StatusCode, String) {
    (StatusCode::OK, body.to_string())
}

// ===========================================================================
// Event contract
// ===========================================================================

#[test]
fn event_text_from_last_nonempty_part() {
    let ev = EventSchema::AdkV1
        .decode_line(r#"{"author":"InventorySpecialist","content":{"role":"model","parts":[{"text":"a"},{"text":"b"},{"text":""}]}}"#)
        .unwrap()
        .unwrap();
    assert_eq!(ev.author(), Some("InventorySpecialist"));
    assert_eq!(ev.text(), Some("b"));
}

#[test]
fn event_empty_top_level_text_falls_back_to_parts() {
    let ev = RunnerEvent::from_author("A")
        .with_text("")
        .with_content(Content::user("from parts"));
    assert_eq!(ev.text(), Some("from parts"));
}

#[test]
fn event_without_text_or_author() {
    let ev = EventSchema::AdkV1
        .decode_line(r#"{"content":{"parts":[{"function_call":{"name":"check_inventory_levels"}}]}}"#)
        .unwrap()
        .unwrap();
    assert_eq!(ev.author(), None);
    assert_eq!(ev.text(), None);
}

#[test]
fn event_unknown_role_is_tolerated() {
    let ev = EventSchema::AdkV1
        .decode_line(r#"{"author":"A","content":{"role":"tool","parts":[{"text":"x"}]}}"#)
        .unwrap()
        .unwrap();
    assert_eq!(ev.content.unwrap().role, Some(Role::Other));
}

#[test]
fn event_error_code_is_remote_error() {
    let err = EventSchema::AdkV1
        .decode_line(r#"{"author":"A","error_code":"SAFETY","error_message":"blocked"}"#)
        .unwrap_err();
    match err {
        EngineError::Remote { code, message } => {
            assert_eq!(code, "SAFETY");
            assert_eq!(message, "blocked");
        }
        other => panic!("Expected Remote, got {:?}", other),
    }
}

#[test]
fn event_error_envelope_is_remote_error() {
    let err = EventSchema::AdkV1
        .decode_line(r#"{"error":{"code":500,"message":"internal"}}"#)
        .unwrap_err();
    assert_eq!(err.to_string(), "remote error 500: internal");
}

#[test]
fn event_garbage_is_stream_error() {
    let err = EventSchema::AdkV1.decode_line("not json at all").unwrap_err();
    assert!(matches!(err, EngineError::StreamError(_)));
}

// ===========================================================================
// Stream decoding
// ===========================================================================

fn chunks(parts: Vec<&'static [u8]>) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
}

#[tokio::test]
async fn stream_handles_arbitrary_chunk_boundaries() {
    let input: Vec<&'static [u8]> = vec![
        b"{\"author\":\"GlobalOrch",
        b"estrator\"}\n{\"author\":\"Inventory",
        b"Specialist\",\"text\":\"caf\xc3",
        b"\xa9\"}\n\n",
    ];
    let events: Vec<_> = parse_event_stream(chunks(input), EventSchema::AdkV1).collect().await;
    assert_eq!(events.len(), 2);
    let first = events[0].as_ref().unwrap();
    let second = events[1].as_ref().unwrap();
    assert_eq!(first.author(), Some("GlobalOrchestrator"));
    assert_eq!(second.text(), Some("café"));
}

#[tokio::test]
async fn stream_flushes_trailing_line() {
    let input: Vec<&'static [u8]> = vec![b"{\"author\":\"A\"}\n{\"author\":\"B\",\"text\":\"done\"}"];
    let events: Vec<_> = parse_event_stream(chunks(input), EventSchema::AdkV1).collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].as_ref().unwrap().text(), Some("done"));
}

#[tokio::test]
async fn stream_stops_after_transport_error() {
    let input = futures::stream::iter(vec![
        Ok(Bytes::from_static(b"{\"author\":\"A\"}\n")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        Ok(Bytes::from_static(b"{\"author\":\"B\"}\n")),
    ]);
    let events: Vec<_> = parse_event_stream(input, EventSchema::AdkV1).collect().await;
    assert_eq!(events.len(), 2);
    assert!(events[0].is_ok());
    assert!(matches!(events[1], Err(EngineError::StreamError(_))));
}

// ===========================================================================
// Runner
// ===========================================================================

#[tokio::test]
async fn runner_posts_stream_query_and_yields_events() {
    let query_path = engine_path(":streamQuery");
    let mock = MockEngine::start(move |method, path, _| {
        if method == Method::POST && path == query_path {
            let lines = [
                r#"{"author":"GlobalOrchestrator","content":{"role":"model","parts":[{"text":"Routing"}]}}"#,
                r#"{"author":"LogisticsManager","content":{"role":"model","parts":[{"text":"| id | status |"}]}}"#,
            ];
            (StatusCode::OK, lines.join("\n") + "\n")
        } else {
            (StatusCode::NOT_FOUND, String::new())
        }
    })
    .await;

    let runner = AgentEngineRunner::new(mock.client());
    let stream = runner
        .run("default_user", "s-1", Content::user("where is PO-17?"))
        .await
        .unwrap();
    let events: Vec<_> = stream.collect().await;
    let authors: Vec<_> = events
        .iter()
        .map(|e| e.as_ref().unwrap().author().unwrap().to_string())
        .collect();
    assert_eq!(authors, vec!["GlobalOrchestrator", "LogisticsManager"]);

    let req = &mock.requests()[0];
    assert_eq!(req.auth.as_deref(), Some("Bearer test-token"));
    assert_eq!(req.body["class_method"], "async_stream_query");
    assert_eq!(req.body["input"]["user_id"], "default_user");
    assert_eq!(req.body["input"]["session_id"], "s-1");
    assert_eq!(req.body["input"]["message"]["role"], "user");
    assert_eq!(req.body["input"]["message"]["parts"][0]["text"], "where is PO-17?");
}

#[tokio::test]
async fn runner_maps_error_statuses() {
    let mock = MockEngine::start(|_, _, _| (StatusCode::FORBIDDEN, "denied".into())).await;
    let runner = AgentEngineRunner::new(mock.client());
    let err = runner.run("u", "s", Content::user("x")).await.err().unwrap();
    assert!(matches!(err, EngineError::AuthFailed(_)));

    let mock = MockEngine::start(|_, _, _| (StatusCode::INTERNAL_SERVER_ERROR, "kaput".into())).await;
    let runner = AgentEngineRunner::new(mock.client());
    let err = runner.run("u", "s", Content::user("x")).await.err().unwrap();
    assert!(err.to_string().contains("kaput"));
}

// ===========================================================================
// VertexSessionService
// ===========================================================================

#[tokio::test]
async fn vertex_create_session_reads_back_session_and_events() {
    let sessions = engine_path("/sessions");
    let session = engine_path("/sessions/s-42");
    let events = engine_path("/sessions/s-42/events");
    let op_name = format!("{}/sessions/s-42/operations/op-1", ENGINE);

    let mock = MockEngine::start(move |method, path, query| {
        if method == Method::POST && path == sessions {
            ok(serde_json::json!({"name": op_name, "done": true}))
        } else if path == session {
            ok(serde_json::json!({
                "name": format!("{}/sessions/s-42", ENGINE),
                "userId": "default_user",
                "sessionState": {"region": "emea"},
                "updateTime": "2026-03-01T10:00:00Z"
            }))
        } else if path == events && query.is_none() {
            ok(serde_json::json!({
                "sessionEvents": [{"author": "user", "content": {"role": "user", "parts": [{"text": "hi"}]}}],
                "nextPageToken": "p2"
            }))
        } else if path == events {
            ok(serde_json::json!({
                "sessionEvents": [{"author": "GlobalOrchestrator", "content": {"role": "model", "parts": [{"text": "hello"}]}}]
            }))
        } else {
            (StatusCode::NOT_FOUND, String::new())
        }
    })
    .await;

    let service = VertexSessionService::new(mock.client());
    let created = service.create_session("SupplyChainOrchestrator", "default_user").await.unwrap();
    assert_eq!(created.id, "s-42");
    assert_eq!(created.app_name, "SupplyChainOrchestrator");
    assert_eq!(created.state["region"], "emea");
    assert_eq!(created.events.len(), 2);
    assert_eq!(created.events[1].author.as_deref(), Some("GlobalOrchestrator"));
    assert!(created.last_update_time.is_some());

    let reqs = mock.requests();
    assert_eq!(reqs[0].body, serde_json::json!({"userId": "default_user"}));
    assert!(reqs.iter().any(|r| r.query.as_deref() == Some("pageToken=p2")));
}

#[tokio::test]
async fn vertex_create_session_polls_unfinished_operation() {
    let sessions = engine_path("/sessions");
    let session = engine_path("/sessions/s-9");
    let op_path = format!("/v1beta1/{}/sessions/s-9/operations/op-9", ENGINE);
    let op_name = format!("{}/sessions/s-9/operations/op-9", ENGINE);
    let polls = Arc::new(Mutex::new(0usize));
    let polls_in = polls.clone();

    let mock = MockEngine::start(move |method, path, _| {
        if method == Method::POST && path == sessions {
            ok(serde_json::json!({"name": op_name, "done": false}))
        } else if path == op_path {
            let mut n = polls_in.lock().unwrap();
            *n += 1;
            ok(serde_json::json!({"name": op_name, "done": *n >= 2}))
        } else if path == session {
            ok(serde_json::json!({"name": "x", "userId": "u"}))
        } else {
            ok(serde_json::json!({"sessionEvents": []}))
        }
    })
    .await;

    let service = VertexSessionService::new(mock.client()).with_poll_interval(Duration::from_millis(5));
    let created = service.create_session("app", "u").await.unwrap();
    assert_eq!(created.id, "s-9");
    assert_eq!(*polls.lock().unwrap(), 2);
}

#[tokio::test]
async fn vertex_get_session_missing_or_foreign_is_none() {
    let foreign = engine_path("/sessions/theirs");
    let mock = MockEngine::start(move |_, path, _| {
        if path == foreign {
            ok(serde_json::json!({"name": "theirs", "userId": "someone_else"}))
        } else {
            (StatusCode::NOT_FOUND, "no such session".into())
        }
    })
    .await;

    let service = VertexSessionService::new(mock.client());
    assert!(service.get_session("app", "me", "gone").await.unwrap().is_none());
    assert!(service.get_session("app", "me", "theirs").await.unwrap().is_none());
}

// ===========================================================================
// VertexMemoryBankService
// ===========================================================================

#[tokio::test]
async fn vertex_memory_generate_references_session() {
    let mock = MockEngine::start(|_, _, _| ok(serde_json::json!({"name": "op"}))).await;
    let memory = VertexMemoryBankService::new(mock.client());
    let session = Session::new("s-5", "SupplyChainOrchestrator", "default_user");
    memory.add_session_to_memory(&session).await.unwrap();

    let req = &mock.requests()[0];
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.path, engine_path("/memories:generate"));
    assert_eq!(
        req.body["vertexSessionSource"]["session"],
        format!("{}/sessions/s-5", ENGINE)
    );
    assert_eq!(req.body["scope"]["app_name"], "SupplyChainOrchestrator");
    assert_eq!(req.body["scope"]["user_id"], "default_user");
}

#[tokio::test]
async fn vertex_memory_retrieve_collects_facts() {
    let mock = MockEngine::start(|_, _, _| {
        ok(serde_json::json!({
            "retrievedMemories": [
                {"memory": {"name": "m/1", "fact": "User manages the Rotterdam warehouse."}},
                {"memory": {"name": "m/2", "fact": "Prefers weekly summaries."}}
            ]
        }))
    })
    .await;
    let memory = VertexMemoryBankService::new(mock.client());
    let facts = memory
        .retrieve(&MemoryScope::new("SupplyChainOrchestrator", "default_user"))
        .await
        .unwrap();
    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].fact, "User manages the Rotterdam warehouse.");
    assert_eq!(mock.requests()[0].body["scope"]["user_id"], "default_user");
}

#[tokio::test]
async fn vertex_memory_failure_is_typed() {
    let mock = MockEngine::start(|_, _, _| (StatusCode::TOO_MANY_REQUESTS, String::new())).await;
    let memory = VertexMemoryBankService::new(mock.client());
    let err = memory
        .add_session_to_memory(&Session::new("s", "a", "u"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RateLimited { .. }));
}

// ===========================================================================
// In-memory services
// ===========================================================================

#[tokio::test]
async fn in_memory_sessions_scope_by_app_and_user() {
    let service = InMemorySessionService::new();
    let s = service.create_session("app", "alice").await.unwrap();
    assert_eq!(service.len(), 1);
    assert!(service.get_session("app", "alice", &s.id).await.unwrap().is_some());
    assert!(service.get_session("app", "bob", &s.id).await.unwrap().is_none());
    assert!(service.get_session("other", "alice", &s.id).await.unwrap().is_none());
}

#[tokio::test]
async fn in_memory_sessions_append_event_visible_on_refresh() {
    let service = InMemorySessionService::new();
    let s = service.create_session("app", "alice").await.unwrap();
    service
        .append_event(&s.id, SessionEvent::new("GlobalOrchestrator", Content::user("noted")))
        .unwrap();
    let refreshed = service.get_session("app", "alice", &s.id).await.unwrap().unwrap();
    assert_eq!(refreshed.events.len(), 1);
    assert!(service.append_event("missing", SessionEvent::default()).is_err());
}

#[tokio::test]
async fn in_memory_memory_dedups_facts_per_scope() {
    let memory = InMemoryMemoryService::new();
    let mut session = Session::new("s", "app", "alice");
    session.events.push(SessionEvent::new(
        "user",
        Content {
            role: Some(Role::User),
            parts: vec![Part::text("Ships from Rotterdam"), Part::text("")],
        },
    ));
    memory.add_session_to_memory(&session).await.unwrap();
    memory.add_session_to_memory(&session).await.unwrap();

    let facts = memory.retrieve(&MemoryScope::new("app", "alice")).await.unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].fact, "Ships from Rotterdam");
    assert!(memory.retrieve(&MemoryScope::new("app", "bob")).await.unwrap().is_empty());
}

// ===========================================================================
// Toolbox
// ===========================================================================

#[tokio::test]
async fn toolbox_loads_sorted_bindings() {
    let mock = MockEngine::start(|_, path, _| {
        if path == "/api/toolset/supply_chain" {
            ok(serde_json::json!({
                "serverVersion": "0.9.0",
                "tools": {
                    "track_shipment_status": {
                        "description": "Track a shipment",
                        "parameters": [{"name": "shipment_id", "type": "string", "description": "id"}]
                    },
                    "check_inventory_levels": {"description": "Stock levels", "parameters": []}
                }
            }))
        } else {
            (StatusCode::NOT_FOUND, String::new())
        }
    })
    .await;

    let toolbox = ToolboxClient::new(format!("{}/", mock.base));
    let tools = toolbox.load_toolset("supply_chain").await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["check_inventory_levels", "track_shipment_status"]);
    assert_eq!(tools[1].parameters[0].name, "shipment_id");
    assert!(tools[1].parameters[0].required);

    assert!(matches!(
        toolbox.load_toolset("nope").await,
        Err(EngineError::NotFound(_))
    ));
}

// ===========================================================================
// Admin
// ===========================================================================

#[tokio::test]
async fn admin_patches_memory_generation_model() {
    let mock = MockEngine::start(|_, _, _| ok(serde_json::json!({"name": "op", "done": false}))).await;
    let admin = EngineAdmin::new(mock.client());
    admin
        .configure_memory_bank("projects/acme/locations/us-central1/publishers/google/models/gemini-2.5-flash")
        .await
        .unwrap();

    let req = &mock.requests()[0];
    assert_eq!(req.method, Method::PATCH);
    assert_eq!(req.path, format!("/v1beta1/{}", ENGINE));
    assert_eq!(
        req.query.as_deref(),
        Some("updateMask=context_spec.memory_bank_config.generation_config")
    );
    assert!(req.body["contextSpec"]["memoryBankConfig"]["generationConfig"]["model"]
        .as_str()
        .unwrap()
        .ends_with("gemini-2.5-flash"));
}

// ===========================================================================
// Credentials
// ===========================================================================

#[tokio::test]
async fn token_source_static_and_anonymous() {
    assert_eq!(TokenSource::fixed("abc").token().await.unwrap().as_deref(), Some("abc"));
    assert_eq!(TokenSource::anonymous().token().await.unwrap(), None);
    assert_eq!(TokenSource::from_token(Some("xyz")).token().await.unwrap().as_deref(), Some("xyz"));
}

#[tokio::test]
async fn token_source_metadata_caches_until_expiry() {
    let mock = MockEngine::start(|_, _, _| {
        ok(serde_json::json!({"access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer"}))
    })
    .await;
    let source = TokenSource::metadata_at(format!("{}/token", mock.base));
    assert_eq!(source.token().await.unwrap().as_deref(), Some("ya29.fresh"));
    assert_eq!(source.token().await.unwrap().as_deref(), Some("ya29.fresh"));

    let reqs = mock.requests();
    assert_eq!(reqs.len(), 1);
}

#[tokio::test]
async fn token_source_metadata_failure_is_credentials_error() {
    let mock = MockEngine::start(|_, _, _| (StatusCode::NOT_FOUND, String::new())).await;
    let source = TokenSource::metadata_at(format!("{}/token", mock.base));
    assert!(matches!(source.token().await, Err(EngineError::Credentials(_))));
}
