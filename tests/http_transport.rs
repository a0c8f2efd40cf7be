//! HTTP and event-stream transports against the mock provider.

mod common;

use std::time::Duration;

use serde_json::json;

use toolbridge::transport::{
    connect, TransportClient, TransportError, TransportKind, TransportParams, TransportSettings,
};

use common::{MockProviderServer, MOCK_SESSION};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

fn http(server: &MockProviderServer, path: &str) -> std::sync::Arc<dyn TransportClient> {
    let params = TransportParams::Http(server.params(path));
    connect("mock", &params, &TransportSettings::default()).unwrap()
}

fn event_stream(server: &MockProviderServer, path: &str) -> std::sync::Arc<dyn TransportClient> {
    let params = TransportParams::EventStream(server.params(path));
    connect("mock", &params, &TransportSettings::default()).unwrap()
}

#[tokio::test]
async fn test_http_list_and_call() {
    let server = MockProviderServer::start().await;
    let client = http(&server, "/rpc");
    assert_eq!(client.kind(), TransportKind::Http);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name, "search");
    assert_eq!(tools[0].input_schema["properties"]["query"]["type"], "string");
    // Missing description and schema fall back to defaults.
    assert_eq!(tools[1].description, "");
    assert_eq!(tools[1].input_schema, json!({"type": "object"}));

    let result = client
        .call_tool("search", json!({"query": "error 500"}), CALL_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result.content["content"][0]["text"], "found: error 500");
}

#[tokio::test]
async fn test_http_echoes_session_and_static_headers() {
    let server = MockProviderServer::start().await;
    let mut params = server.params("/rpc");
    params
        .headers
        .insert("Authorization".into(), "Bearer secret".into());
    let client = connect(
        "mock",
        &TransportParams::Http(params),
        &TransportSettings::default(),
    )
    .unwrap();

    client.list_tools().await.unwrap();
    client
        .call_tool("count", json!({}), CALL_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(
        server.sessions_seen(),
        vec![None, Some(MOCK_SESSION.to_string())]
    );
    assert!(server
        .auth_seen()
        .iter()
        .all(|a| a.as_deref() == Some("Bearer secret")));
}

#[tokio::test]
async fn test_http_rpc_error_is_protocol_error() {
    let server = MockProviderServer::start().await;
    let client = http(&server, "/rpc");

    let err = client
        .call_tool("boom", json!({}), CALL_TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.rpc_code(), Some(-32000));
    assert!(!err.is_unknown_tool());
    assert!(err.to_string().contains("backend exploded"));

    let err = client
        .call_tool("nope", json!({}), CALL_TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_unknown_tool());
}

#[tokio::test]
async fn test_http_status_and_body_failures() {
    let server = MockProviderServer::start().await;

    let err = http(&server, "/broken").list_tools().await.unwrap_err();
    assert!(matches!(err, TransportError::ProtocolError { .. }), "{err:?}");
    assert!(err.to_string().contains("500"));

    let err = http(&server, "/garbage").list_tools().await.unwrap_err();
    assert!(matches!(err, TransportError::ProtocolError { .. }), "{err:?}");
}

#[tokio::test]
async fn test_http_error_body_is_truncated() {
    let server = MockProviderServer::start().await;
    let err = http(&server, "/broken-verbose")
        .call_tool("count", json!({}), CALL_TIMEOUT)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("HTTP 500: stack frame"), "{message}");
    assert!(message.len() < 400, "{} bytes", message.len());
}

#[tokio::test]
async fn test_http_timeout() {
    let server = MockProviderServer::start().await;
    let client = http(&server, "/slow");
    let err = client
        .call_tool("count", json!({}), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }), "{err:?}");
}

#[tokio::test]
async fn test_event_stream_list_and_call() {
    let server = MockProviderServer::start().await;
    let client = event_stream(&server, "/sse");
    assert_eq!(client.kind(), TransportKind::EventStream);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 2);

    let result = client
        .call_tool("search", json!({"query": "latency"}), CALL_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result.content["content"][0]["text"], "found: latency");
    assert_eq!(
        server.sessions_seen(),
        vec![None, Some(MOCK_SESSION.to_string())]
    );
}

#[tokio::test]
async fn test_event_stream_rpc_error() {
    let server = MockProviderServer::start().await;
    let client = event_stream(&server, "/sse");
    let err = client
        .call_tool("nope", json!({}), CALL_TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_unknown_tool(), "{err:?}");
}

#[tokio::test]
async fn test_event_stream_accepts_plain_json_reply() {
    let server = MockProviderServer::start().await;
    let client = event_stream(&server, "/sse-json");
    assert_eq!(client.list_tools().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_event_stream_done_without_response() {
    let server = MockProviderServer::start().await;
    let client = event_stream(&server, "/sse-truncated");
    let err = client.list_tools().await.unwrap_err();
    assert!(matches!(err, TransportError::ProtocolError { .. }), "{err:?}");
    assert!(err.to_string().contains("without a response"));
}

#[tokio::test]
async fn test_event_stream_multibyte_text_split_across_chunks() {
    let server = MockProviderServer::start().await;
    let client = event_stream(&server, "/sse-utf8");
    let result = client
        .call_tool("search", json!({"query": "café über"}), CALL_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result.content["content"][0]["text"], "found: café über");
}

#[tokio::test]
async fn test_event_stream_timeout() {
    let server = MockProviderServer::start().await;
    let client = event_stream(&server, "/slow");
    let err = client
        .call_tool("count", json!({}), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }), "{err:?}");
}
