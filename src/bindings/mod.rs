//! Binding Resolver: which providers a turn may reach.
//!
//! Maps an index name and connection id to the ordered, filtered list of
//! bindings whose glob pattern matches. Multiple bindings may match one
//! index and all of them apply (union, not first-match-wins).

pub mod glob;
pub mod resolver;

pub use glob::matches;
pub use resolver::{unique_providers, BindingResolver};
