//! Transport error types.

use thiserror::Error;

/// Errors a transport client can surface for `list_tools` / `call_tool`.
///
/// A well-formed JSON-RPC error response is a normal outcome and maps to
/// `ProtocolError` with the provider's code; the client stays usable.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The provider could not be reached (spawn failure, broken pipe,
    /// refused connection, process exit).
    #[error("provider '{provider}' unreachable: {reason}")]
    ConnectFailure { provider: String, reason: String },

    /// Malformed response, non-success HTTP status, or JSON-RPC error object.
    #[error("provider '{provider}' protocol error{}: {message}", fmt_code(.code))]
    ProtocolError {
        provider: String,
        code: Option<i64>,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// No response within the caller's window.
    #[error("provider '{provider}' timed out after {timeout_ms}ms during {operation}")]
    Timeout {
        provider: String,
        operation: String,
        timeout_ms: u64,
    },
}

fn fmt_code(code: &Option<i64>) -> String {
    match code {
        Some(c) => format!(" [{c}]"),
        None => String::new(),
    }
}

impl TransportError {
    /// Build a `ConnectFailure` for `provider`.
    pub fn connect(provider: &str, reason: impl Into<String>) -> Self {
        TransportError::ConnectFailure {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Build a `ProtocolError` without a JSON-RPC code.
    pub fn protocol(provider: &str, message: impl Into<String>) -> Self {
        TransportError::ProtocolError {
            provider: provider.to_string(),
            code: None,
            message: message.into(),
            data: None,
        }
    }

    /// Build a `Timeout` for `operation`.
    pub fn timeout(provider: &str, operation: &str, timeout_ms: u64) -> Self {
        TransportError::Timeout {
            provider: provider.to_string(),
            operation: operation.to_string(),
            timeout_ms,
        }
    }

    /// The provider id this error refers to.
    pub fn provider(&self) -> &str {
        match self {
            TransportError::ConnectFailure { provider, .. }
            | TransportError::ProtocolError { provider, .. }
            | TransportError::Timeout { provider, .. } => provider,
        }
    }

    /// The JSON-RPC error code, if the provider sent one.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            TransportError::ProtocolError { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether the provider rejected the tool name itself.
    ///
    /// `-32601` is always treated as an unknown tool for `tools/call`.
    /// `-32602` only counts when the message says the tool is unknown or
    /// missing, since it also covers bad arguments.
    pub fn is_unknown_tool(&self) -> bool {
        match self {
            TransportError::ProtocolError {
                code: Some(code),
                message,
                ..
            } => {
                if *code == super::types::error_codes::METHOD_NOT_FOUND {
                    return true;
                }
                if *code == super::types::error_codes::INVALID_PARAMS {
                    let lower = message.to_lowercase();
                    return lower.contains("unknown tool")
                        || (lower.contains("tool") && lower.contains("not found"));
                }
                false
            }
            _ => false,
        }
    }
}
