//! Provider registry accessor.

use std::sync::Arc;

use super::errors::StoreError;
use super::store::ProviderStore;
use super::types::ToolProvider;

/// Thin read accessor over the configured providers.
#[derive(Clone)]
pub struct ProviderRegistry {
    store: Arc<dyn ProviderStore>,
}

impl ProviderRegistry {
    pub fn new(store: Arc<dyn ProviderStore>) -> Self {
        Self { store }
    }

    pub fn get_provider(&self, id: &str) -> Result<Option<ToolProvider>, StoreError> {
        self.store.get_provider(id)
    }

    pub fn list_providers(&self, enabled_only: bool) -> Result<Vec<ToolProvider>, StoreError> {
        let mut providers = self.store.list_providers()?;
        if enabled_only {
            providers.retain(|p| p.enabled);
        }
        Ok(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::store::tests::http_provider;
    use crate::registry::store::MemoryStore;

    #[test]
    fn test_list_providers_enabled_filter() {
        let mut off = http_provider("off");
        off.enabled = false;
        let store = MemoryStore::new(vec![http_provider("on"), off], vec![]).unwrap();
        let registry = ProviderRegistry::new(Arc::new(store));

        assert_eq!(registry.list_providers(false).unwrap().len(), 2);
        let enabled = registry.list_providers(true).unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "on");
        assert!(registry.get_provider("off").unwrap().is_some());
        assert!(registry.get_provider("nope").unwrap().is_none());
    }
}
