//! JSON-RPC over a server-sent event stream.
//!
//! The request is POSTed as for plain HTTP. The provider may answer with a
//! single JSON body or with an SSE stream (`data: …\n\n`) carrying progress
//! notifications and, eventually, the response. Events are accumulated
//! until a response with the matching id arrives or the `[DONE]` marker /
//! end of stream is reached.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client as HttpClient;

use super::client::{RpcChannel, TransportSettings};
use super::envelope::{decode_response, expect_id, next_request_id};
use super::errors::TransportError;
use super::http::{build_http_client, check_status, map_reqwest_error, SessionId, SESSION_HEADER};
use super::types::{HttpParams, JsonRpcRequest, JsonRpcResponse};

/// Completion marker some providers send after the final event.
const DONE_MARKER: &str = "[DONE]";

// ─── Event Accumulator ───────────────────────────────────────────────────────

/// Outcome of feeding one SSE event.
#[derive(Debug)]
pub(crate) enum EventOutcome {
    /// Keep reading.
    Pending,
    /// The matching response arrived.
    Complete(JsonRpcResponse),
    /// The provider signalled the end of the stream.
    Done,
}

/// Accumulates SSE events for one request id.
pub(crate) struct EventAccumulator {
    provider: String,
    id: u64,
    /// Data from events that did not parse as a complete message on their own.
    fragments: String,
    events_seen: usize,
}

impl EventAccumulator {
    pub(crate) fn new(provider: &str, id: u64) -> Self {
        Self {
            provider: provider.to_string(),
            id,
            fragments: String::new(),
            events_seen: 0,
        }
    }

    /// Process one raw SSE event (the text between blank lines).
    pub(crate) fn feed_event(&mut self, event: &str) -> EventOutcome {
        let mut data = String::new();
        for line in event.lines() {
            if let Some(value) = line.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value.strip_prefix(' ').unwrap_or(value));
            }
            // `event:`, `id:`, `retry:` and `:` comment lines carry nothing we need.
        }

        let data = data.trim();
        if data.is_empty() {
            return EventOutcome::Pending;
        }
        self.events_seen += 1;

        if data == DONE_MARKER {
            return EventOutcome::Done;
        }

        if let Ok(message) = serde_json::from_str::<JsonRpcResponse>(data) {
            self.fragments.clear();
            if message.answers(self.id) {
                return EventOutcome::Complete(message);
            }
            if let Some(method) = message.method.as_deref() {
                tracing::debug!(provider = %self.provider, method, "event-stream notification");
            } else {
                tracing::debug!(provider = %self.provider, id = ?message.id, "ignoring message for another request");
            }
            return EventOutcome::Pending;
        }

        // Only the head of a JSON object may open a fragment run.
        if self.fragments.is_empty() && !data.starts_with('{') {
            tracing::debug!(provider = %self.provider, "ignoring non-JSON event data");
            return EventOutcome::Pending;
        }

        // Partial payload: keep accumulating and retry as one document.
        self.fragments.push_str(data);
        match serde_json::from_str::<JsonRpcResponse>(&self.fragments) {
            Ok(message) if message.answers(self.id) => {
                self.fragments.clear();
                EventOutcome::Complete(message)
            }
            _ => EventOutcome::Pending,
        }
    }

    /// Resolve the stream once no more events will arrive.
    pub(crate) fn finish(self) -> Result<JsonRpcResponse, TransportError> {
        if !self.fragments.trim().is_empty() {
            let decoded = decode_response(&self.provider, &self.fragments)?;
            return expect_id(&self.provider, self.id, decoded);
        }
        Err(TransportError::protocol(
            &self.provider,
            format!(
                "event stream ended without a response ({} events received)",
                self.events_seen
            ),
        ))
    }
}

/// Raw SSE bytes waiting to be framed into events.
///
/// Bytes stay undecoded until a whole event is present, so a multi-byte
/// character split across network chunks is decoded intact. `\r\n` and a
/// lone `\r` are normalized to `\n` as bytes arrive.
#[derive(Debug, Default)]
pub(crate) struct EventBuffer {
    bytes: Vec<u8>,
    after_cr: bool,
}

impl EventBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            match byte {
                b'\r' => {
                    self.bytes.push(b'\n');
                    self.after_cr = true;
                }
                b'\n' if self.after_cr => self.after_cr = false,
                _ => {
                    self.bytes.push(byte);
                    self.after_cr = false;
                }
            }
        }
    }

    /// Pop the next complete event (terminated by a blank line).
    pub(crate) fn next_event(&mut self, provider: &str) -> Result<Option<String>, TransportError> {
        let Some(end) = self.bytes.windows(2).position(|w| w == b"\n\n") else {
            return Ok(None);
        };
        let event: Vec<u8> = self.bytes.drain(..end + 2).take(end).collect();
        decode_event(provider, event).map(Some)
    }

    /// Take whatever is left once the stream has ended.
    pub(crate) fn take_rest(&mut self, provider: &str) -> Result<Option<String>, TransportError> {
        if self.bytes.iter().all(u8::is_ascii_whitespace) {
            self.bytes.clear();
            return Ok(None);
        }
        decode_event(provider, std::mem::take(&mut self.bytes)).map(Some)
    }
}

fn decode_event(provider: &str, bytes: Vec<u8>) -> Result<String, TransportError> {
    String::from_utf8(bytes).map_err(|e| {
        TransportError::protocol(provider, format!("event stream is not valid UTF-8: {e}"))
    })
}

// ─── EventStreamChannel ──────────────────────────────────────────────────────

/// `RpcChannel` reading responses from a server-sent event stream.
pub struct EventStreamChannel {
    provider_id: String,
    url: String,
    http: HttpClient,
    session: SessionId,
}

impl EventStreamChannel {
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

    async fn read_stream(
        &self,
        id: u64,
        method: &str,
        timeout: Duration,
        response: reqwest::Response,
    ) -> Result<JsonRpcResponse, TransportError> {
        let provider = self.provider_id.as_str();
        let mut accumulator = EventAccumulator::new(provider, id);
        let mut byte_stream = response.bytes_stream();
        let mut buffer = EventBuffer::default();

        loop {
            while let Some(event) = buffer.next_event(provider)? {
                match accumulator.feed_event(&event) {
                    EventOutcome::Pending => {}
                    EventOutcome::Complete(message) => return Ok(message),
                    EventOutcome::Done => return accumulator.finish(),
                }
            }

            match byte_stream.next().await {
                Some(Ok(bytes)) => buffer.push(&bytes),
                Some(Err(e)) => return Err(map_reqwest_error(provider, method, timeout, e)),
                None => {
                    // A final event may lack the trailing blank line.
                    if let Some(rest) = buffer.take_rest(provider)? {
                        if let EventOutcome::Complete(message) = accumulator.feed_event(&rest) {
                            return Ok(message);
                        }
                    }
                    return accumulator.finish();
                }
            }
        }
    }
}

#[async_trait]
impl RpcChannel for EventStreamChannel {
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
                .header(ACCEPT, "application/json, text/event-stream")
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

            let is_event_stream = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.starts_with("text/event-stream"))
                .unwrap_or(false);

            if is_event_stream {
                self.read_stream(id, method, timeout, response).await
            } else {
                let body = response
                    .text()
                    .await
                    .map_err(|e| map_reqwest_error(provider, method, timeout, e))?;
                expect_id(provider, id, decode_response(provider, &body)?)
            }
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::timeout(provider, method, timeout.as_millis() as u64))?
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_of(raw: &[u8]) -> EventBuffer {
        let mut buffer = EventBuffer::default();
        buffer.push(raw);
        buffer
    }

    #[test]
    fn test_next_event_splits_on_blank_line() {
        let mut buffer = buffer_of(b"data: one\n\ndata: two\n\npartial");
        assert_eq!(buffer.next_event("p").unwrap().as_deref(), Some("data: one"));
        assert_eq!(buffer.next_event("p").unwrap().as_deref(), Some("data: two"));
        assert_eq!(buffer.next_event("p").unwrap(), None);
        assert_eq!(buffer.take_rest("p").unwrap().as_deref(), Some("partial"));
    }

    #[test]
    fn test_next_event_handles_crlf() {
        let mut buffer = buffer_of(b"data: one\r\n\r\n");
        assert_eq!(buffer.next_event("p").unwrap().as_deref(), Some("data: one"));
        assert_eq!(buffer.take_rest("p").unwrap(), None);
    }

    #[test]
    fn test_next_event_handles_lone_cr() {
        let mut buffer = buffer_of(b"event: message\rdata: one\r\rdata: two\r\r");
        assert_eq!(
            buffer.next_event("p").unwrap().as_deref(),
            Some("event: message\ndata: one")
        );
        assert_eq!(buffer.next_event("p").unwrap().as_deref(), Some("data: two"));
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut buffer = EventBuffer::default();
        buffer.push(b"data: one\r");
        buffer.push(b"\n\r");
        buffer.push(b"\ndata: two\r\n\r\n");
        assert_eq!(buffer.next_event("p").unwrap().as_deref(), Some("data: one"));
        assert_eq!(buffer.next_event("p").unwrap().as_deref(), Some("data: two"));
        assert_eq!(buffer.next_event("p").unwrap(), None);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let raw = "data: {\"text\":\"café\"}\n\n".as_bytes();
        let cut = raw.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = EventBuffer::default();
        buffer.push(&raw[..cut]);
        assert_eq!(buffer.next_event("p").unwrap(), None);
        buffer.push(&raw[cut..]);
        assert_eq!(
            buffer.next_event("p").unwrap().as_deref(),
            Some("data: {\"text\":\"café\"}")
        );
    }

    #[test]
    fn test_invalid_utf8_event_is_protocol_error() {
        let mut buffer = buffer_of(b"data: \xFF\xFE\n\n");
        let err = buffer.next_event("p").unwrap_err();
        assert!(matches!(err, TransportError::ProtocolError { .. }));
    }

    #[test]
    fn test_progress_then_response() {
        let mut acc = EventAccumulator::new("p", 5);
        let progress = r#"event: message
data: {"jsonrpc":"2.0","method":"notifications/progress","params":{"progress":1}}"#;
        assert!(matches!(acc.feed_event(progress), EventOutcome::Pending));

        let done = r#"data: {"jsonrpc":"2.0","id":5,"result":{"content":[]}}"#;
        match acc.feed_event(done) {
            EventOutcome::Complete(resp) => assert_eq!(resp.id, Some(5)),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_fragments_accumulate_until_done() {
        let mut acc = EventAccumulator::new("p", 9);
        assert!(matches!(
            acc.feed_event(r#"data: {"jsonrpc":"2.0","id":9,"#),
            EventOutcome::Pending
        ));
        assert!(matches!(
            acc.feed_event(r#"data: "result":{"text":"hello"}}"#),
            EventOutcome::Complete(_)
        ));
    }

    #[test]
    fn test_non_json_data_does_not_poison_fragments() {
        let mut acc = EventAccumulator::new("p", 4);
        assert!(matches!(acc.feed_event("data: ping"), EventOutcome::Pending));
        assert!(matches!(
            acc.feed_event(r#"data: {"jsonrpc":"2.0","id":4,"#),
            EventOutcome::Pending
        ));
        match acc.feed_event(r#"data: "result":{"text":"pong"}}"#) {
            EventOutcome::Complete(resp) => assert_eq!(resp.id, Some(4)),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_standalone_message_resets_fragments() {
        let mut acc = EventAccumulator::new("p", 6);
        assert!(matches!(acc.feed_event("data: {\"trunc"), EventOutcome::Pending));
        let progress = r#"data: {"jsonrpc":"2.0","method":"notifications/progress","params":{}}"#;
        assert!(matches!(acc.feed_event(progress), EventOutcome::Pending));
        assert!(matches!(
            acc.feed_event(r#"data: {"jsonrpc":"2.0","id":6,"#),
            EventOutcome::Pending
        ));
        assert!(matches!(
            acc.feed_event(r#"data: "result":{}}"#),
            EventOutcome::Complete(_)
        ));
    }

    #[test]
    fn test_done_without_response_is_protocol_error() {
        let mut acc = EventAccumulator::new("p", 1);
        assert!(matches!(acc.feed_event("data: [DONE]"), EventOutcome::Done));
        let err = acc.finish().unwrap_err();
        assert!(matches!(err, TransportError::ProtocolError { .. }));
        assert!(err.to_string().contains("without a response"));
    }

    #[test]
    fn test_comments_and_keepalives_ignored() {
        let mut acc = EventAccumulator::new("p", 1);
        assert!(matches!(acc.feed_event(": keep-alive"), EventOutcome::Pending));
        assert!(matches!(acc.feed_event("event: ping"), EventOutcome::Pending));
        assert_eq!(acc.events_seen, 0);
    }

    #[test]
    fn test_response_for_other_id_is_skipped() {
        let mut acc = EventAccumulator::new("p", 2);
        assert!(matches!(
            acc.feed_event(r#"data: {"jsonrpc":"2.0","id":3,"result":{}}"#),
            EventOutcome::Pending
        ));
    }
}
