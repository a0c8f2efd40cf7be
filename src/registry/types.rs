//! Provider and binding records.

use serde::{Deserialize, Serialize};

use crate::transport::{TransportKind, TransportParams};

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

/// One externally reachable tool source.
///
/// A process-kind provider's OS process is not part of its identity; it is
/// spawned and torn down freely by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProvider {
    pub id: String,
    /// Display name shown to admins.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub transport: TransportParams,
}

impl ToolProvider {
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Rule "provider P is reachable when the index matches pattern X",
/// scoped to one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBinding {
    /// Glob pattern matched against the full index name (`*` wildcards).
    pub index_pattern: String,
    pub provider_id: String,
    pub connection_id: String,
    /// Lower values resolve first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the binding applies automatically to every matching turn.
    #[serde(default = "default_true")]
    pub auto_include: bool,
    /// Opaque per-binding configuration, passed through unmodified.
    #[serde(default)]
    pub config: serde_json::Value,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
