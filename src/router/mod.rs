//! Tool Router: the top of the stack.
//!
//! Submodules:
//! - `tool_router`: `ToolRouter`, catalog fan-out and `invoke` demultiplexing
//! - `turn`: the per-turn handle given to the conversation loop
//! - `pool`: owned transport clients keyed by provider id
//! - `qualify`: provider-qualified tool names and their inverse
//! - `types`: `QualifiedTool`, `ToolCallResult`, `TurnCatalog`, settings
//! - `errors`: routing error types

pub mod errors;
pub mod pool;
pub mod qualify;
pub mod tool_router;
pub mod turn;
pub mod types;

// Re-exports for convenience
pub use errors::RouterError;
pub use pool::{ClientFactory, ClientPool, WireClientFactory};
pub use qualify::{qualify, split_qualified, SEPARATOR};
pub use tool_router::ToolRouter;
pub use turn::Turn;
pub use types::{ProviderFailure, QualifiedTool, RouterSettings, ToolCallResult, TurnCatalog};
