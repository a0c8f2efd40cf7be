//! Transport Client: JSON-RPC to tool providers over three channel kinds.
//!
//! This module handles:
//! - The shared JSON-RPC 2.0 envelope and error taxonomy
//! - Spawning provider processes and speaking line-delimited JSON-RPC over stdio
//! - One-POST-per-call HTTP providers
//! - Event-stream (SSE) providers whose responses arrive incrementally
//! - Tool discovery (`tools/list`) and invocation (`tools/call`) on top of any channel

pub mod client;
pub mod envelope;
pub mod errors;
pub mod event_stream;
pub mod http;
pub mod process;
pub mod types;

// Re-exports for convenience
pub use client::{connect, ProviderClient, RpcChannel, TransportClient, TransportSettings};
pub use errors::TransportError;
pub use types::{
    HttpParams, ProcessParams, ToolCatalogEntry, ToolResult, TransportKind, TransportParams,
};
