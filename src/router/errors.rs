//! Tool Router error types.

use thiserror::Error;

use crate::registry::StoreError;

/// Routing failures surfaced to the conversation loop.
///
/// Transport failures during `invoke` are not listed here; they come back
/// as a failed `ToolCallResult` so the model sees the error.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The provider id is not (or no longer) reachable for this turn.
    #[error("unknown provider '{provider}'")]
    UnknownProvider {
        provider: String,
    },

    /// The provider rejected the bare tool name.
    #[error("provider '{provider}' has no tool '{tool}'")]
    UnknownTool {
        provider: String,
        tool: String,
    },

    /// The model-issued name carries no provider qualification.
    #[error("'{name}' is not a provider-qualified tool name")]
    InvalidQualifiedName {
        name: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RouterError {
    pub fn unknown_provider(provider: &str) -> Self {
        Self::UnknownProvider {
            provider: provider.to_string(),
        }
    }
}
