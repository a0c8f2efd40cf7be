//! Transport client: one interface over three wire channels.
//!
//! `RpcChannel` is the per-variant seam (one request in, one response out).
//! `ProviderClient` layers tool discovery and invocation on top of any
//! channel, so every variant shares the same `tools/list` / `tools/call`
//! handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::envelope::extract_result;
use super::errors::TransportError;
use super::event_stream::EventStreamChannel;
use super::http::HttpChannel;
use super::process::ProcessChannel;
use super::types::{
    methods, JsonRpcResponse, ToolCatalogEntry, ToolListPage, ToolResult, TransportKind,
    TransportParams,
};

// ─── Settings ────────────────────────────────────────────────────────────────

/// Timeouts and limits applied by transport clients.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// TCP connect timeout for HTTP-based channels.
    pub connect_timeout: Duration,
    /// Budget for spawning a process provider and completing the handshake.
    pub init_timeout: Duration,
    /// Grace period between the shutdown notification and a forced kill.
    pub shutdown_timeout: Duration,
    /// Per-request window used by `list_tools` for each page.
    pub discovery_timeout: Duration,
    /// Upper bound on `tools/list` pages followed via `nextCursor`.
    pub max_list_pages: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            init_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(10),
            max_list_pages: 32,
        }
    }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A bidirectional JSON-RPC channel to one provider.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Send `method` and wait up to `timeout` for the matching response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, TransportError>;

    /// Release any owned resources (child process, sessions).
    async fn close(&self) {}
}

/// The capability every provider connection exposes to the router.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Provider id this client is bound to.
    fn provider_id(&self) -> &str;

    fn kind(&self) -> TransportKind;

    /// Fetch the provider's tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolCatalogEntry>, TransportError>;

    /// Invoke a bare-named tool.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<ToolResult, TransportError>;

    /// Tear down the underlying connection.
    async fn shutdown(&self) {}
}

// ─── ProviderClient ──────────────────────────────────────────────────────────

/// `TransportClient` implementation generic over the wire channel.
pub struct ProviderClient<C: RpcChannel> {
    provider_id: String,
    kind: TransportKind,
    channel: C,
    discovery_timeout: Duration,
    max_list_pages: usize,
}

impl<C: RpcChannel> ProviderClient<C> {
    pub fn new(provider_id: &str, kind: TransportKind, channel: C, settings: &TransportSettings) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            kind,
            channel,
            discovery_timeout: settings.discovery_timeout,
            max_list_pages: settings.max_list_pages.max(1),
        }
    }

    /// Access the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }
}

#[async_trait]
impl<C: RpcChannel> TransportClient for ProviderClient<C> {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn list_tools(&self) -> Result<Vec<ToolCatalogEntry>, TransportError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _page in 0..self.max_list_pages {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let response = self
                .channel
                .request(methods::TOOLS_LIST, params, self.discovery_timeout)
                .await?;
            let result = extract_result(&self.provider_id, response)?;

            let page: ToolListPage = serde_json::from_value(result).map_err(|e| {
                TransportError::protocol(
                    &self.provider_id,
                    format!("failed to parse tools/list result: {e}"),
                )
            })?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    tracing::debug!(
                        provider = %self.provider_id,
                        tool_count = tools.len(),
                        "fetched tool catalog"
                    );
                    return Ok(tools);
                }
            }
        }

        tracing::warn!(
            provider = %self.provider_id,
            max_pages = self.max_list_pages,
            "tools/list pagination limit reached, catalog truncated"
        );
        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<ToolResult, TransportError> {
        let start = Instant::now();
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let response = self
            .channel
            .request(methods::TOOLS_CALL, Some(params), timeout)
            .await?;
        let result = extract_result(&self.provider_id, response)?;

        Ok(ToolResult::from_result(
            result,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn shutdown(&self) {
        self.channel.close().await;
    }
}

// ─── Factory ─────────────────────────────────────────────────────────────────

/// Build the transport client for a provider's transport parameters.
///
/// Nothing is contacted here; process providers spawn on first use and
/// HTTP providers connect per request.
pub fn connect(
    provider_id: &str,
    params: &TransportParams,
    settings: &TransportSettings,
) -> Result<Arc<dyn TransportClient>, TransportError> {
    let client: Arc<dyn TransportClient> = match params {
        TransportParams::Process(p) => Arc::new(ProviderClient::new(
            provider_id,
            TransportKind::Process,
            ProcessChannel::new(provider_id, p.clone(), settings),
            settings,
        )),
        TransportParams::Http(p) => Arc::new(ProviderClient::new(
            provider_id,
            TransportKind::Http,
            HttpChannel::new(provider_id, p.clone(), settings)?,
            settings,
        )),
        TransportParams::EventStream(p) => Arc::new(ProviderClient::new(
            provider_id,
            TransportKind::EventStream,
            EventStreamChannel::new(provider_id, p.clone(), settings)?,
            settings,
        )),
    };
    Ok(client)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
