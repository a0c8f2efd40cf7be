//! Types produced by the Tool Router.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::ToolCatalogEntry;

use super::qualify::qualify;

// ─── Settings ────────────────────────────────────────────────────────────────

/// Router-level timeouts.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Budget for one provider's whole catalog fetch during fan-out.
    pub catalog_timeout: Duration,
    /// Per-invocation window handed to the transport client.
    pub call_timeout: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            catalog_timeout: Duration::from_secs(15),
            call_timeout: Duration::from_secs(120),
        }
    }
}

// ─── QualifiedTool ───────────────────────────────────────────────────────────

/// A provider tool as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifiedTool {
    /// Qualified name: encoded provider id, `__`, bare name.
    pub name: String,
    pub provider_id: String,
    /// Name the provider itself knows the tool by.
    pub tool_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl QualifiedTool {
    pub fn new(provider_id: &str, entry: ToolCatalogEntry) -> Self {
        Self {
            name: qualify(provider_id, &entry.name),
            provider_id: provider_id.to_string(),
            tool_name: entry.name,
            description: entry.description,
            input_schema: entry.input_schema,
        }
    }

    /// Render as an OpenAI-style function-calling tool definition.
    pub fn to_openai_tool(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// A provider whose catalog could not be fetched for a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub error: String,
}

/// Aggregated catalog for one turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnCatalog {
    /// Tools in binding priority order, each provider's tools contiguous.
    pub tools: Vec<QualifiedTool>,
    /// Providers skipped because their fetch failed.
    pub failures: Vec<ProviderFailure>,
}

impl TurnCatalog {
    /// Tool definitions in function-calling format.
    pub fn openai_tools(&self) -> Vec<serde_json::Value> {
        self.tools.iter().map(QualifiedTool::to_openai_tool).collect()
    }
}

// ─── ToolCallResult ──────────────────────────────────────────────────────────

/// Outcome of a routed tool call, returned to the conversation loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallResult {
    pub qualified_name: String,
    pub provider_id: String,
    pub tool_name: String,
    /// False when the transport failed or the provider flagged the result.
    pub success: bool,
    /// The provider's result payload, when one arrived.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ToolCallResult {
    /// Text suitable for feeding back to the model as the tool message.
    pub fn model_text(&self) -> String {
        match (&self.result, &self.error) {
            (Some(result), _) => content_text(result).unwrap_or_else(|| result.to_string()),
            (None, Some(error)) => format!("Error: {error}"),
            (None, None) => String::new(),
        }
    }
}

/// Join the `text` parts of an MCP-style `content` array, if present.
pub(crate) fn content_text(result: &serde_json::Value) -> Option<String> {
    let parts: Vec<&str> = result
        .get("content")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}
