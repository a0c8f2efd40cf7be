//! JSON-RPC over plain HTTP: one POST per request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client as HttpClient;

use super::client::{RpcChannel, TransportSettings};
use super::envelope::{decode_response, expect_id, next_request_id, preview};
use super::errors::TransportError;
use super::types::{HttpParams, JsonRpcRequest, JsonRpcResponse};

/// Session header some providers issue and expect echoed back.
pub(crate) const SESSION_HEADER: &str = "mcp-session-id";

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Build a reqwest client with the provider's static headers.
pub(crate) fn build_http_client(
    provider: &str,
    params: &HttpParams,
    settings: &TransportSettings,
) -> Result<HttpClient, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &params.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            TransportError::connect(provider, format!("invalid header name '{name}': {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TransportError::connect(provider, format!("invalid value for header '{name}': {e}"))
        })?;
        headers.insert(name, value);
    }

    HttpClient::builder()
        .connect_timeout(settings.connect_timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| TransportError::connect(provider, format!("failed to build HTTP client: {e}")))
}

/// Map a reqwest send/read error into the transport taxonomy.
pub(crate) fn map_reqwest_error(
    provider: &str,
    method: &str,
    timeout: Duration,
    e: reqwest::Error,
) -> TransportError {
    if e.is_timeout() {
        TransportError::timeout(provider, method, timeout.as_millis() as u64)
    } else if e.is_connect() || e.is_request() {
        TransportError::connect(provider, format!("request failed: {e}"))
    } else {
        TransportError::protocol(provider, format!("failed to read response: {e}"))
    }
}

/// Reject non-success statuses, keeping a body preview for diagnostics.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::ProtocolError {
        provider: provider.to_string(),
        code: None,
        message: format!("HTTP {}: {}", status.as_u16(), preview(&body)),
        data: None,
    })
}

/// Remembers the provider-issued session id between requests.
#[derive(Default)]
pub(crate) struct SessionId(std::sync::Mutex<Option<String>>);

impl SessionId {
    pub(crate) fn get(&self) -> Option<String> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn capture(&self, response: &reqwest::Response) {
        if let Some(value) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self
                .0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(value.to_string());
        }
    }
}

// ─── HttpChannel ─────────────────────────────────────────────────────────────

/// `RpcChannel` posting each envelope to the provider URL.
pub struct HttpChannel {
    provider_id: String,
    url: String,
    http: HttpClient,
    session: SessionId,
}

impl HttpChannel {
    pub fn new(
        provider_id: &str,
        params: HttpParams,
        settings: &TransportSettings,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            provider_id: provider_id.to_string(),
            http: build_http_client(provider_id, &params, settings)?,
            url: params.url,
            session: SessionId::default(),
        })
    }
}

#[async_trait]
impl RpcChannel for HttpChannel {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, TransportError> {
        let provider = self.provider_id.as_str();
        let id = next_request_id();
        let envelope = JsonRpcRequest::new(id, method, params);

        let exchange = async {
            let mut req = self
                .http
                .post(&self.url)
                .timeout(timeout)
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/json")
                .json(&envelope);
            if let Some(session) = self.session.get() {
                req = req.header(SESSION_HEADER, session);
            }

            let response = req
                .send()
                .await
                .map_err(|e| map_reqwest_error(provider, method, timeout, e))?;
            let response = check_status(provider, response).await?;
            self.session.capture(&response);

            let body = response
                .text()
                .await
                .map_err(|e| map_reqwest_error(provider, method, timeout, e))?;
            let decoded = decode_response(provider, &body)?;
            expect_id(provider, id, decoded)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::timeout(provider, method, timeout.as_millis() as u64))?
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
