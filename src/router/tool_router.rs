//! Tool Router: per-turn catalog aggregation and call demultiplexing.
//!
//! Flow for one turn:
//! 1. Resolve bindings for `(index, connection)` and dedupe providers
//! 2. Fan out `tools/list` to every reachable provider concurrently, each
//!    under its own timeout
//! 3. Qualify and concatenate the catalogs in priority order
//! 4. Route model-issued calls back to the owning provider
//!
//! Nothing is cached across turns; `invoke` re-resolves bindings so a
//! qualification that went stale since the catalog was built is caught.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use super::errors::RouterError;
use super::pool::{ClientFactory, ClientPool, WireClientFactory};
use super::qualify::split_qualified;
use super::types::{
    content_text, ProviderFailure, QualifiedTool, RouterSettings, ToolCallResult, TurnCatalog,
};
use crate::bindings::BindingResolver;
use crate::registry::{ProviderRegistry, ProviderStore, ToolProvider};
use crate::transport::{TransportError, TransportSettings};

pub struct ToolRouter {
    resolver: BindingResolver,
    registry: ProviderRegistry,
    pool: ClientPool,
    settings: RouterSettings,
}

impl ToolRouter {
    pub fn new(
        store: Arc<dyn ProviderStore>,
        factory: Arc<dyn ClientFactory>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            resolver: BindingResolver::new(store.clone()),
            registry: ProviderRegistry::new(store),
            pool: ClientPool::new(factory),
            settings,
        }
    }

    /// Router that reaches providers over their configured wire transports.
    pub fn with_wire_clients(
        store: Arc<dyn ProviderStore>,
        transport: TransportSettings,
        settings: RouterSettings,
    ) -> Self {
        Self::new(store, Arc::new(WireClientFactory::new(transport)), settings)
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Providers reachable for a turn, in binding priority order.
    ///
    /// Bindings that point at a missing or disabled provider are skipped.
    fn reachable_providers(
        &self,
        index_name: &str,
        connection_id: &str,
    ) -> Result<Vec<ToolProvider>, RouterError> {
        let bindings = self.resolver.resolve_providers(index_name, connection_id)?;
        let mut providers = Vec::with_capacity(bindings.len());
        for binding in bindings {
            match self.registry.get_provider(&binding.provider_id)? {
                Some(provider) if provider.enabled => providers.push(provider),
                Some(_) => {
                    tracing::debug!(
                        provider = %binding.provider_id,
                        pattern = %binding.index_pattern,
                        "binding skipped, provider disabled"
                    );
                }
                None => {
                    tracing::warn!(
                        provider = %binding.provider_id,
                        pattern = %binding.index_pattern,
                        connection = connection_id,
                        "binding references unknown provider, skipped"
                    );
                }
            }
        }
        Ok(providers)
    }

    /// Qualified tools for a turn. Unreachable providers are omitted.
    pub async fn get_tools_for_turn(
        &self,
        index_name: &str,
        connection_id: &str,
    ) -> Result<Vec<QualifiedTool>, RouterError> {
        Ok(self.fetch_turn_catalog(index_name, connection_id).await?.tools)
    }

    /// Like `get_tools_for_turn`, also reporting which providers failed.
    pub async fn fetch_turn_catalog(
        &self,
        index_name: &str,
        connection_id: &str,
    ) -> Result<TurnCatalog, RouterError> {
        let providers = self.reachable_providers(index_name, connection_id)?;
        if providers.is_empty() {
            tracing::debug!(
                index = index_name,
                connection = connection_id,
                "no providers bound, empty catalog"
            );
            return Ok(TurnCatalog::default());
        }

        let start = Instant::now();
        let fetches = providers.iter().map(|p| self.fetch_provider_tools(p));
        let outcomes = join_all(fetches).await;

        let mut catalog = TurnCatalog::default();
        for (provider, outcome) in providers.iter().zip(outcomes) {
            match outcome {
                Ok(tools) => catalog.tools.extend(tools),
                Err(e) => {
                    tracing::warn!(
                        provider = %provider.id,
                        index = index_name,
                        error = %e,
                        "provider catalog fetch failed, tools omitted"
                    );
                    catalog.failures.push(ProviderFailure {
                        provider_id: provider.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            index = index_name,
            connection = connection_id,
            providers = providers.len(),
            failed = catalog.failures.len(),
            tools = catalog.tools.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "aggregated tool catalog"
        );
        Ok(catalog)
    }

    async fn fetch_provider_tools(
        &self,
        provider: &ToolProvider,
    ) -> Result<Vec<QualifiedTool>, TransportError> {
        let client = self.pool.get_or_create(provider)?;
        let timeout = self.settings.catalog_timeout;
        let entries = tokio::time::timeout(timeout, client.list_tools())
            .await
            .map_err(|_| {
                TransportError::timeout(&provider.id, "tools/list", timeout.as_millis() as u64)
            })??;
        Ok(entries
            .into_iter()
            .map(|entry| QualifiedTool::new(&provider.id, entry))
            .collect())
    }

    /// Route a model-issued call to the owning provider.
    ///
    /// Routing failures (`UnknownProvider`, `UnknownTool`,
    /// `InvalidQualifiedName`) are returned as errors. Transport failures
    /// come back as an unsuccessful `ToolCallResult`.
    pub async fn invoke(
        &self,
        index_name: &str,
        connection_id: &str,
        qualified_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, RouterError> {
        let (provider_id, tool_name) =
            split_qualified(qualified_name).ok_or_else(|| RouterError::InvalidQualifiedName {
                name: qualified_name.to_string(),
            })?;

        let provider = self
            .reachable_providers(index_name, connection_id)?
            .into_iter()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| {
                tracing::warn!(
                    provider = %provider_id,
                    tool = %tool_name,
                    index = index_name,
                    connection = connection_id,
                    "call targets a provider not bound to this turn"
                );
                RouterError::unknown_provider(&provider_id)
            })?;

        let start = Instant::now();
        let failed = |error: String| ToolCallResult {
            qualified_name: qualified_name.to_string(),
            provider_id: provider_id.clone(),
            tool_name: tool_name.clone(),
            success: false,
            result: None,
            error: Some(error),
            execution_time_ms: start.elapsed().as_millis() as u64,
        };

        let client = match self.pool.get_or_create(&provider) {
            Ok(client) => client,
            Err(e) => return Ok(failed(e.to_string())),
        };

        match client
            .call_tool(&tool_name, arguments, self.settings.call_timeout)
            .await
        {
            Ok(result) => {
                let error = result.is_error.then(|| {
                    content_text(&result.content)
                        .unwrap_or_else(|| "tool reported an error".to_string())
                });
                tracing::info!(
                    provider = %provider_id,
                    tool = %tool_name,
                    success = !result.is_error,
                    elapsed_ms = result.execution_time_ms,
                    "tool call completed"
                );
                Ok(ToolCallResult {
                    qualified_name: qualified_name.to_string(),
                    provider_id: provider_id.clone(),
                    tool_name: tool_name.clone(),
                    success: !result.is_error,
                    result: Some(result.content),
                    error,
                    execution_time_ms: result.execution_time_ms,
                })
            }
            Err(e) if e.is_unknown_tool() => {
                tracing::warn!(
                    provider = %provider_id,
                    tool = %tool_name,
                    error = %e,
                    "provider rejected tool name"
                );
                Err(RouterError::UnknownTool {
                    provider: provider_id.clone(),
                    tool: tool_name.clone(),
                })
            }
            Err(e) => {
                tracing::warn!(
                    provider = %provider_id,
                    tool = %tool_name,
                    error = %e,
                    "tool call failed"
                );
                Ok(failed(e.to_string()))
            }
        }
    }

    /// Shut down all pooled provider connections.
    pub async fn shutdown(&self) {
        self.pool.shutdown_all().await;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
