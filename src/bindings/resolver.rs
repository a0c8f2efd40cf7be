//! Binding resolution: index name + connection id → ordered bindings.

use std::collections::HashSet;
use std::sync::Arc;

use super::glob;
use crate::registry::{IndexBinding, ProviderStore, StoreError};

/// Resolves which bindings apply to a turn.
///
/// Reads the store on every call; there is no cross-turn cache.
#[derive(Clone)]
pub struct BindingResolver {
    store: Arc<dyn ProviderStore>,
}

impl BindingResolver {
    pub fn new(store: Arc<dyn ProviderStore>) -> Self {
        Self { store }
    }

    /// Bindings for `connection_id` whose pattern matches `index_name`,
    /// ascending by priority (ties keep stored order).
    ///
    /// With `enabled_only`, bindings that are disabled or not auto-included
    /// are dropped. No match yields an empty list, never an implicit
    /// "everything" fallback; a catch-all must be an explicit `*` binding.
    pub fn resolve_bindings(
        &self,
        index_name: &str,
        connection_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<IndexBinding>, StoreError> {
        let candidates = self.store.list_bindings(connection_id)?;
        let total = candidates.len();

        let mut matched: Vec<IndexBinding> = candidates
            .into_iter()
            .filter(|b| glob::matches(&b.index_pattern, index_name))
            .filter(|b| !enabled_only || (b.enabled && b.auto_include))
            .collect();

        // `sort_by_key` is stable, so equal priorities keep encounter order.
        matched.sort_by_key(|b| b.priority);

        tracing::debug!(
            index = index_name,
            connection = connection_id,
            candidates = total,
            matched = matched.len(),
            "resolved index bindings"
        );
        Ok(matched)
    }

    /// `resolve_bindings` with `enabled_only = true`, deduplicated so each
    /// provider appears once at its earliest (lowest-priority) position.
    pub fn resolve_providers(
        &self,
        index_name: &str,
        connection_id: &str,
    ) -> Result<Vec<IndexBinding>, StoreError> {
        let bindings = self.resolve_bindings(index_name, connection_id, true)?;
        Ok(unique_providers(bindings))
    }
}

/// Keep the first binding per provider id, preserving order.
///
/// When a provider is reached through several bindings with different
/// `config` blobs, the first one in priority order wins.
pub fn unique_providers(bindings: Vec<IndexBinding>) -> Vec<IndexBinding> {
    let mut seen = HashSet::new();
    bindings
        .into_iter()
        .filter(|b| seen.insert(b.provider_id.clone()))
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::store::tests::{binding, http_provider};
    use crate::registry::MemoryStore;

    fn resolver(bindings: Vec<IndexBinding>) -> BindingResolver {
        let store = MemoryStore::new(
            vec![http_provider("A"), http_provider("B"), http_provider("C")],
            bindings,
        )
        .unwrap();
        BindingResolver::new(Arc::new(store))
    }

    fn providers(bindings: &[IndexBinding]) -> Vec<&str> {
        bindings.iter().map(|b| b.provider_id.as_str()).collect()
    }

    #[test]
    fn test_prefix_and_catch_all() {
        let r = resolver(vec![
            binding("logs-*", "A", "c1", 1),
            binding("*", "B", "c1", 10),
        ]);
        let logs = r.resolve_bindings("logs-app", "c1", true).unwrap();
        assert_eq!(providers(&logs), vec!["A", "B"]);

        let metrics = r.resolve_bindings("metrics-app", "c1", true).unwrap();
        assert_eq!(providers(&metrics), vec!["B"]);
    }

    #[test]
    fn test_no_bindings_resolves_empty() {
        let r = resolver(vec![binding("*", "A", "other", 1)]);
        assert!(r.resolve_bindings("anything", "c1", true).unwrap().is_empty());
        assert!(r.resolve_providers("anything", "c1").unwrap().is_empty());
    }

    #[test]
    fn test_no_matching_pattern_resolves_empty() {
        let r = resolver(vec![binding("logs-*", "A", "c1", 1)]);
        assert!(r.resolve_bindings("metrics", "c1", true).unwrap().is_empty());
    }

    #[test]
    fn test_priority_sort_is_stable() {
        let r = resolver(vec![
            binding("*", "A", "c1", 5),
            binding("*", "B", "c1", 1),
            binding("*", "C", "c1", 5),
        ]);
        let resolved = r.resolve_bindings("idx", "c1", true).unwrap();
        assert_eq!(providers(&resolved), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_enabled_and_auto_include_filters() {
        let mut disabled = binding("*", "A", "c1", 1);
        disabled.enabled = false;
        let mut manual = binding("*", "B", "c1", 2);
        manual.auto_include = false;
        let r = resolver(vec![disabled, manual, binding("*", "C", "c1", 3)]);

        let filtered = r.resolve_bindings("idx", "c1", true).unwrap();
        assert_eq!(providers(&filtered), vec!["C"]);

        let all = r.resolve_bindings("idx", "c1", false).unwrap();
        assert_eq!(providers(&all), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let r = resolver(vec![
            binding("logs-*", "A", "c1", 3),
            binding("*", "B", "c1", 3),
            binding("logs-app", "C", "c1", 0),
        ]);
        let first = r.resolve_bindings("logs-app", "c1", true).unwrap();
        let second = r.resolve_bindings("logs-app", "c1", true).unwrap();
        assert_eq!(first, second);
        assert_eq!(providers(&first), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_duplicate_provider_keeps_earliest() {
        let mut late = binding("*", "A", "c1", 9);
        late.config = serde_json::json!({"source": "catch-all"});
        let mut early = binding("logs-*", "A", "c1", 1);
        early.config = serde_json::json!({"source": "logs"});
        let r = resolver(vec![late, binding("*", "B", "c1", 5), early]);

        let unique = r.resolve_providers("logs-app", "c1").unwrap();
        assert_eq!(providers(&unique), vec!["A", "B"]);
        assert_eq!(unique[0].config["source"], "logs");
    }

    #[test]
    fn test_matching_uses_literal_index_name() {
        let r = resolver(vec![binding("logs", "A", "c1", 1)]);
        assert!(r.resolve_bindings("logs-alias", "c1", true).unwrap().is_empty());
        assert_eq!(r.resolve_bindings("logs", "c1", true).unwrap().len(), 1);
    }
}
