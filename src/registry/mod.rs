//! Provider Registry: configured providers and index bindings.
//!
//! Submodules:
//! - `types`: `ToolProvider` and `IndexBinding` records
//! - `store`: the read-only `ProviderStore` interface and an in-memory store
//! - `database`: SQLite persistence for providers and bindings
//! - `providers`: `ProviderRegistry`, the enabled-flag-aware accessor
//! - `errors`: store error types

pub mod database;
pub mod errors;
pub mod providers;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use database::SqliteStore;
pub use errors::StoreError;
pub use providers::ProviderRegistry;
pub use store::{MemoryStore, ProviderStore};
pub use types::{IndexBinding, ToolProvider};
