//! Read interface over the durable provider/binding records.

use std::sync::{PoisonError, RwLock};

use super::errors::StoreError;
use super::types::{IndexBinding, ToolProvider};

/// Reads the provider and binding records.
///
/// Implementations must tolerate unsynchronized concurrent reads from
/// many turns. Bindings are returned in stored (encounter) order.
pub trait ProviderStore: Send + Sync {
    fn list_providers(&self) -> Result<Vec<ToolProvider>, StoreError>;

    fn get_provider(&self, id: &str) -> Result<Option<ToolProvider>, StoreError>;

    /// All bindings scoped to `connection_id`, in stored order.
    fn list_bindings(&self, connection_id: &str) -> Result<Vec<IndexBinding>, StoreError>;
}

/// Reject records the router could not use.
pub(crate) fn validate_provider(provider: &ToolProvider) -> Result<(), StoreError> {
    if provider.id.trim().is_empty() {
        return Err(StoreError::Invalid {
            reason: "provider id must not be empty".into(),
        });
    }
    Ok(())
}

pub(crate) fn validate_binding(binding: &IndexBinding) -> Result<(), StoreError> {
    if binding.index_pattern.is_empty() {
        return Err(StoreError::Invalid {
            reason: format!(
                "binding for provider '{}' has an empty index pattern",
                binding.provider_id
            ),
        });
    }
    if binding.connection_id.is_empty() {
        return Err(StoreError::Invalid {
            reason: format!(
                "binding '{}' -> '{}' has an empty connection id",
                binding.index_pattern, binding.provider_id
            ),
        });
    }
    Ok(())
}

// ─── MemoryStore ─────────────────────────────────────────────────────────────

/// In-memory store, typically built from the configuration file.
///
/// Writes exist for the admin side (and tests); the router only reads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    providers: RwLock<Vec<ToolProvider>>,
    bindings: RwLock<Vec<IndexBinding>>,
}

impl MemoryStore {
    pub fn new(
        providers: Vec<ToolProvider>,
        bindings: Vec<IndexBinding>,
    ) -> Result<Self, StoreError> {
        let mut seen = std::collections::HashSet::new();
        for provider in &providers {
            validate_provider(provider)?;
            if !seen.insert(provider.id.as_str()) {
                return Err(StoreError::Invalid {
                    reason: format!("duplicate provider id '{}'", provider.id),
                });
            }
        }
        for binding in &bindings {
            validate_binding(binding)?;
        }

        Ok(Self {
            providers: RwLock::new(providers),
            bindings: RwLock::new(bindings),
        })
    }

    /// Insert or replace a provider by id.
    pub fn upsert_provider(&self, provider: ToolProvider) -> Result<(), StoreError> {
        validate_provider(&provider)?;
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        match providers.iter_mut().find(|p| p.id == provider.id) {
            Some(existing) => *existing = provider,
            None => providers.push(provider),
        }
        Ok(())
    }

    /// Remove a provider; bindings referencing it are left dangling.
    pub fn remove_provider(&self, id: &str) -> bool {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        let before = providers.len();
        providers.retain(|p| p.id != id);
        providers.len() != before
    }

    /// Append a binding.
    pub fn add_binding(&self, binding: IndexBinding) -> Result<(), StoreError> {
        validate_binding(&binding)?;
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(binding);
        Ok(())
    }

    /// Remove every binding matching the natural key. Returns the count removed.
    pub fn remove_binding(&self, connection_id: &str, index_pattern: &str, provider_id: &str) -> usize {
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        let before = bindings.len();
        bindings.retain(|b| {
            !(b.connection_id == connection_id
                && b.index_pattern == index_pattern
                && b.provider_id == provider_id)
        });
        before - bindings.len()
    }
}

impl ProviderStore for MemoryStore {
    fn list_providers(&self) -> Result<Vec<ToolProvider>, StoreError> {
        Ok(self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn get_provider(&self, id: &str) -> Result<Option<ToolProvider>, StoreError> {
        Ok(self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    fn list_bindings(&self, connection_id: &str) -> Result<Vec<IndexBinding>, StoreError> {
        Ok(self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|b| b.connection_id == connection_id)
            .cloned()
            .collect())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
