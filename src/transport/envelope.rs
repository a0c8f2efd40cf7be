//! JSON-RPC envelope helpers shared by the channel implementations.

use std::sync::atomic::{AtomicU64, Ordering};

use super::errors::TransportError;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Process-wide monotonic request id counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request id.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Encoding ────────────────────────────────────────────────────────────────

/// Serialize a request as one newline-terminated line (stdio framing).
pub fn encode_line(provider: &str, request: &JsonRpcRequest) -> Result<String, TransportError> {
    let mut json = serde_json::to_string(request).map_err(|e| {
        TransportError::protocol(provider, format!("failed to serialize request: {e}"))
    })?;
    json.push('\n');
    Ok(json)
}

/// Serialize a notification as one newline-terminated line.
pub fn encode_notification_line(
    provider: &str,
    notification: &JsonRpcNotification,
) -> Result<String, TransportError> {
    let mut json = serde_json::to_string(notification).map_err(|e| {
        TransportError::protocol(provider, format!("failed to serialize notification: {e}"))
    })?;
    json.push('\n');
    Ok(json)
}

/// Parse a complete response body (HTTP / accumulated SSE payload).
pub fn decode_response(provider: &str, body: &str) -> Result<JsonRpcResponse, TransportError> {
    serde_json::from_str::<JsonRpcResponse>(body.trim()).map_err(|e| {
        TransportError::protocol(
            provider,
            format!("malformed JSON-RPC response: {e} (body: {})", preview(body)),
        )
    })
}

pub(crate) fn preview(body: &str) -> &str {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a response, converting a JSON-RPC error object
/// into `ProtocolError` with the provider's code and message.
pub fn extract_result(
    provider: &str,
    response: JsonRpcResponse,
) -> Result<serde_json::Value, TransportError> {
    if let Some(err) = response.error {
        return Err(TransportError::ProtocolError {
            provider: provider.to_string(),
            code: Some(err.code),
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or_else(|| TransportError::ProtocolError {
        provider: provider.to_string(),
        code: Some(super::types::error_codes::INTERNAL_ERROR),
        message: "response missing both result and error".into(),
        data: None,
    })
}

/// Verify a response answers request `id`.
pub fn expect_id(
    provider: &str,
    id: u64,
    response: JsonRpcResponse,
) -> Result<JsonRpcResponse, TransportError> {
    if response.answers(id) {
        return Ok(response);
    }
    // Some providers answer request-level parse failures with `id: null`.
    if response.id.is_none() && response.error.is_some() {
        return Ok(response);
    }
    Err(TransportError::protocol(
        provider,
        format!(
            "response id {:?} does not match request id {id}",
            response.id
        ),
    ))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::types::JsonRpcError;

    fn response(id: Option<u64>, result: Option<serde_json::Value>, error: Option<JsonRpcError>) -> JsonRpcResponse {
        JsonRpcResponse {
            id,
            result,
            error,
            method: None,
        }
    }

    #[test]
    fn test_next_request_id_is_monotonic() {
        let id1 = next_request_id();
        let id2 = next_request_id();
        assert!(id2 > id1);
    }

    #[test]
    fn test_encode_line_is_newline_terminated() {
        let line = encode_line("p", &JsonRpcRequest::new(3, "tools/list", None)).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_extract_result_success() {
        let value = extract_result("p", response(Some(1), Some(serde_json::json!({"ok": 1})), None))
            .unwrap();
        assert_eq!(value["ok"], 1);
    }

    #[test]
    fn test_extract_result_error_carries_code() {
        let err = extract_result(
            "p",
            response(
                Some(1),
                None,
                Some(JsonRpcError {
                    code: -32000,
                    message: "disk full".into(),
                    data: Some(serde_json::json!({"free": 0})),
                }),
            ),
        )
        .unwrap_err();
        match err {
            TransportError::ProtocolError { code, message, data, .. } => {
                assert_eq!(code, Some(-32000));
                assert_eq!(message, "disk full");
                assert!(data.is_some());
            }
            other => panic!("expected ProtocolError, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_result_missing_both() {
        let err = extract_result("p", response(Some(1), None, None)).unwrap_err();
        assert!(matches!(err, TransportError::ProtocolError { .. }));
    }

    #[test]
    fn test_decode_response_rejects_garbage() {
        let err = decode_response("p", "<html>502</html>").unwrap_err();
        assert!(err.to_string().contains("malformed JSON-RPC response"));
    }

    #[test]
    fn test_expect_id_mismatch() {
        let ok = response(Some(4), Some(serde_json::json!({})), None);
        assert!(expect_id("p", 4, ok.clone()).is_ok());
        assert!(expect_id("p", 5, ok).is_err());

        let null_id_error = response(
            None,
            None,
            Some(JsonRpcError {
                code: -32700,
                message: "Parse error".into(),
                data: None,
            }),
        );
        assert!(expect_id("p", 9, null_id_error).is_ok());
    }
}
