//! Turn handle handed to the conversation loop.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use super::errors::RouterError;
use super::tool_router::ToolRouter;
use super::types::{QualifiedTool, ToolCallResult, TurnCatalog};

/// One conversation turn bound to an index and a connection.
///
/// `tools()` builds the catalog for the LLM request and `invoke()` is the
/// routing callback for model-issued calls. Every log line emitted through
/// the handle carries the turn id.
#[derive(Clone)]
pub struct Turn {
    router: Arc<ToolRouter>,
    turn_id: Uuid,
    index_name: String,
    connection_id: String,
}

impl ToolRouter {
    /// Open a turn for `(index_name, connection_id)`.
    pub fn begin_turn(self: &Arc<Self>, index_name: &str, connection_id: &str) -> Turn {
        Turn {
            router: self.clone(),
            turn_id: Uuid::new_v4(),
            index_name: index_name.to_string(),
            connection_id: connection_id.to_string(),
        }
    }
}

impl Turn {
    pub fn id(&self) -> Uuid {
        self.turn_id
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "turn",
            turn_id = %self.turn_id,
            index = %self.index_name,
            connection = %self.connection_id,
        )
    }

    /// Aggregated catalog, including per-provider failures.
    pub async fn catalog(&self) -> Result<TurnCatalog, RouterError> {
        self.router
            .fetch_turn_catalog(&self.index_name, &self.connection_id)
            .instrument(self.span())
            .await
    }

    /// Qualified tools available to the model this turn.
    pub async fn tools(&self) -> Result<Vec<QualifiedTool>, RouterError> {
        Ok(self.catalog().await?.tools)
    }

    /// Route one model-issued call.
    pub async fn invoke(
        &self,
        qualified_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, RouterError> {
        self.router
            .invoke(
                &self.index_name,
                &self.connection_id,
                qualified_name,
                arguments,
            )
            .instrument(self.span())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::registry::store::tests::{binding, http_provider};
    use crate::registry::MemoryStore;
    use crate::router::tool_router::tests::{Catalog, FakeFactory};
    use crate::router::RouterSettings;

    fn router() -> Arc<ToolRouter> {
        let store = MemoryStore::new(
            vec![http_provider("A")],
            vec![binding("logs-*", "A", "c1", 1)],
        )
        .unwrap();
        let factory = FakeFactory::default().with("A", Catalog::Tools(vec!["read_file"]));
        Arc::new(ToolRouter::new(
            Arc::new(store),
            Arc::new(factory),
            RouterSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_turn_lists_and_invokes() {
        let router = router();
        let turn = router.begin_turn("logs-app", "c1");
        assert_eq!(turn.index_name(), "logs-app");
        assert_eq!(turn.connection_id(), "c1");

        let tools = turn.tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "A__read_file");

        let result = turn.invoke(&tools[0].name, json!({"path": "a"})).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_turns_get_distinct_ids() {
        let router = router();
        let a = router.begin_turn("logs-app", "c1");
        let b = router.begin_turn("logs-app", "c1");
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_turn_scopes_invoke_to_its_index() {
        let router = router();
        let turn = router.begin_turn("metrics", "c1");
        assert!(turn.tools().await.unwrap().is_empty());
        let err = turn.invoke("A__read_file", json!({})).await.unwrap_err();
        assert!(matches!(err, RouterError::UnknownProvider { .. }));
    }
}
