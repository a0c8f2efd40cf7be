//! Wire types shared by every transport variant.
//!
//! JSON-RPC 2.0 envelope plus the tool catalog / tool result shapes.

use serde::{Deserialize, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
///
/// `id` is optional so that server-originated notifications and
/// id-less parse errors deserialize without failing the read loop.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    /// Present only on notifications / server requests.
    #[serde(default)]
    pub method: Option<String>,
}

impl JsonRpcResponse {
    /// Whether this message answers the request with `id`.
    pub fn answers(&self, id: u64) -> bool {
        self.method.is_none()
            && self.id == Some(id)
            && (self.result.is_some() || self.error.is_some())
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

// ─── Tool Catalog ───────────────────────────────────────────────────────────

/// A tool as discovered at the transport level (bare name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCatalogEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_input_schema", alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

pub(crate) fn default_input_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object" })
}

/// One page of a `tools/list` response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToolListPage {
    #[serde(default)]
    pub tools: Vec<ToolCatalogEntry>,
    #[serde(default, alias = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// Result of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    /// The provider's raw `result` payload.
    pub content: serde_json::Value,
    /// Set when the provider flagged the result itself as an error
    /// (`isError: true`) while still answering successfully.
    pub is_error: bool,
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub(crate) fn from_result(content: serde_json::Value, execution_time_ms: u64) -> Self {
        let is_error = content
            .get("isError")
            .or_else(|| content.get("is_error"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Self {
            content,
            is_error,
            execution_time_ms,
        }
    }
}

// ─── Transport Parameters ───────────────────────────────────────────────────

/// Which wire mechanism reaches a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Process,
    Http,
    EventStream,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Process => "process",
            TransportKind::Http => "http",
            TransportKind::EventStream => "event-stream",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spawn parameters for a process-kind provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessParams {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
    /// Working directory for the child.
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Endpoint parameters for the HTTP and event-stream kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpParams {
    pub url: String,
    /// Static headers sent with every request.
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
}

/// Transport kind plus its connection parameters.
///
/// Serialized with a `transport` tag so a provider record reads as
/// `{ transport: process, command: ..., args: [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "kebab-case")]
pub enum TransportParams {
    Process(ProcessParams),
    Http(HttpParams),
    EventStream(HttpParams),
}

impl TransportParams {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportParams::Process(_) => TransportKind::Process,
            TransportParams::Http(_) => TransportKind::Http,
            TransportParams::EventStream(_) => TransportKind::EventStream,
        }
    }
}

// ─── Standard Error Codes ───────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Method names used on the wire.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const SHUTDOWN: &str = "shutdown";
}

// ─── Tests ───────────────────────────────────────────────────────────────────
