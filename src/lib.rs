//! Index-scoped tool routing for a conversational search assistant.
//!
//! Each conversation turn targets one search index on one connection. The
//! bridge decides which external tool providers that turn may reach,
//! collects their tool catalogs into one provider-qualified list for the
//! model, and routes model-issued tool calls back to the owning provider.
//!
//! Layers, bottom to top:
//! - [`transport`]: JSON-RPC to a provider over a child process, HTTP, or
//!   an event stream
//! - [`registry`]: configured providers and index bindings
//! - [`bindings`]: index name + connection → applicable bindings
//! - [`router`]: per-turn catalog aggregation and call demultiplexing
//!
//! No matching binding means no tools. There is no implicit fallback to
//! every configured provider.

pub mod bindings;
pub mod config;
pub mod logging;
pub mod registry;
pub mod router;
pub mod transport;

pub use bindings::BindingResolver;
pub use config::{BridgeConfig, ConfigError};
pub use registry::{IndexBinding, MemoryStore, ProviderStore, SqliteStore, StoreError, ToolProvider};
pub use router::{
    QualifiedTool, RouterError, RouterSettings, ToolCallResult, ToolRouter, Turn, TurnCatalog,
};
pub use transport::{TransportClient, TransportError, TransportKind, TransportSettings};
