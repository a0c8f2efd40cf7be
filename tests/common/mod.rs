//! Shared fixtures: an axum mock tool provider and demo-process helpers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use toolbridge::transport::{HttpParams, ProcessParams};

pub const MOCK_SESSION: &str = "mock-session-1";

/// Path of the demo stdio provider built alongside the tests.
pub fn demo_provider(args: &[&str]) -> ProcessParams {
    ProcessParams {
        command: env!("CARGO_BIN_EXE_toolbridge-demo-provider").to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        env: [("RUST_LOG".to_string(), "warn".to_string())].into_iter().collect(),
        cwd: None,
    }
}

// ─── Mock HTTP Provider ──────────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    /// `Mcp-Session-Id` header of each request, in arrival order.
    sessions: Mutex<Vec<Option<String>>>,
    /// `Authorization` header of each request.
    auth: Mutex<Vec<Option<String>>>,
}

/// In-process provider speaking JSON-RPC over HTTP and SSE.
///
/// Routes:
/// - `/rpc`: plain JSON responses
/// - `/sse`: event-stream responses with progress noise and split payloads
/// - `/sse-json`: event-stream endpoint that answers with plain JSON
/// - `/sse-truncated`: stream that ends with `[DONE]` and no response
/// - `/sse-utf8`: event-stream response cut inside a multi-byte character
/// - `/broken`: always HTTP 500
/// - `/broken-verbose`: HTTP 500 with a very long body
/// - `/garbage`: 200 with a non-JSON body
/// - `/slow`: answers after two seconds
pub struct MockProviderServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockProviderServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/rpc", post(rpc_json))
            .route("/sse", post(rpc_sse))
            .route("/sse-json", post(rpc_json))
            .route("/sse-truncated", post(rpc_sse_truncated))
            .route("/sse-utf8", post(rpc_sse_utf8))
            .route("/broken", post(broken))
            .route("/broken-verbose", post(broken_verbose))
            .route("/garbage", post(garbage))
            .route("/slow", post(slow))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn params(&self, path: &str) -> HttpParams {
        HttpParams {
            url: self.url(path),
            headers: Default::default(),
        }
    }

    pub fn sessions_seen(&self) -> Vec<Option<String>> {
        self.state.sessions.lock().unwrap().clone()
    }

    pub fn auth_seen(&self) -> Vec<Option<String>> {
        self.state.auth.lock().unwrap().clone()
    }
}

fn record(state: &MockState, headers: &HeaderMap) {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.sessions.lock().unwrap().push(get("mcp-session-id"));
    state.auth.lock().unwrap().push(get("authorization"));
}

/// Compute the JSON-RPC response for a request.
fn dispatch(request: &Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let ok = |result: Value| json!({"jsonrpc": "2.0", "id": id, "result": result});
    let err = |code: i64, message: String| {
        json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
    };

    match method {
        "tools/list" => ok(json!({
            "tools": [
                {
                    "name": "search",
                    "description": "Full-text search",
                    "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}
                },
                {"name": "count"}
            ]
        })),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let args = params.get("arguments").cloned().unwrap_or(Value::Null);
            match name {
                "search" => {
                    let query = args.get("query").and_then(Value::as_str).unwrap_or("");
                    ok(json!({"content": [{"type": "text", "text": format!("found: {query}")}]}))
                }
                "count" => ok(json!({"content": [{"type": "text", "text": "42"}]})),
                "boom" => err(-32000, "backend exploded".into()),
                other => err(-32602, format!("Unknown tool: {other}")),
            }
        }
        other => err(-32601, format!("Method not found: {other}")),
    }
}

fn with_session(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert("mcp-session-id", HeaderValue::from_static(MOCK_SESSION));
    response
}

async fn rpc_json(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    record(&state, &headers);
    with_session(Json(dispatch(&request)).into_response())
}

fn event_stream(chunks: Vec<String>) -> Response {
    byte_event_stream(chunks.into_iter().map(String::into_bytes).collect())
}

/// Event-stream body sent as the given raw network chunks.
fn byte_event_stream(chunks: Vec<Vec<u8>>) -> Response {
    let stream = futures::stream::iter(
        chunks
            .into_iter()
            .map(Ok::<_, std::convert::Infallible>),
    );
    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    response
}

async fn rpc_sse(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    record(&state, &headers);
    let reply = dispatch(&request).to_string();
    // Split the payload across two `data:` lines at a JSON token boundary.
    let cut = reply.find(",\"").map(|i| i + 1).unwrap_or(reply.len());
    let (head, tail) = reply.split_at(cut);

    let progress = json!({
        "jsonrpc": "2.0",
        "method": "notifications/progress",
        "params": {"progress": 50, "total": 100}
    });
    let chunks = vec![
        ": keep-alive\n\n".to_string(),
        format!("event: message\ndata: {progress}\n\n"),
        // Response event delivered in two network chunks.
        format!("event: message\ndata: {head}\n"),
        format!("data: {tail}\n\n"),
        "data: [DONE]\n\n".to_string(),
    ];
    with_session(event_stream(chunks))
}

async fn rpc_sse_truncated(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(_request): Json<Value>,
) -> Response {
    record(&state, &headers);
    let progress = json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
    event_stream(vec![
        format!("data: {progress}\n\n"),
        "data: [DONE]\n\n".to_string(),
    ])
}

async fn rpc_sse_utf8(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    record(&state, &headers);
    let event = format!("data: {}\n\n", dispatch(&request)).into_bytes();
    // Cut right after the lead byte of the first multi-byte character.
    let cut = event
        .iter()
        .position(|b| *b >= 0xC0)
        .map(|i| i + 1)
        .unwrap_or(event.len());
    let (head, tail) = event.split_at(cut);
    with_session(byte_event_stream(vec![
        head.to_vec(),
        tail.to_vec(),
        b"data: [DONE]\n\n".to_vec(),
    ]))
}

async fn broken() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable").into_response()
}

async fn broken_verbose() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "stack frame\n".repeat(500)).into_response()
}

async fn garbage() -> Response {
    (StatusCode::OK, "<html>not json</html>").into_response()
}

async fn slow(Json(request): Json<Value>) -> Response {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(dispatch(&request)).into_response()
}
