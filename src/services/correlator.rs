//! Flow correlation
//!
//! Pairs intercepted request and response bodies into round trips. The
//! pending table is keyed by the flow id the interception layer assigns;
//! for a well-behaved collaborator requests and responses on one flow
//! alternate strictly, and distinct concurrent exchanges get distinct
//! flow ids.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::intercept::FlowId;
use crate::models::api::{ApiRequest, ApiResponse, ExchangeResponse};
use crate::models::session::RoundTrip;
use crate::services::assembler::assemble_stream_response;
use crate::utils::error::{helpers, MonitorError, MonitorResult};

/// A parsed request waiting for its response
#[derive(Debug, Clone)]
struct PendingRequest {
    /// Full request body, kept for prompt token counting and export
    raw: Value,
    /// Whether the caller asked for a streamed response
    stream: bool,
}

/// Correlates intercepted request/response events into round trips
#[derive(Debug, Default)]
pub struct FlowCorrelator {
    pending: HashMap<FlowId, PendingRequest>,
}

impl FlowCorrelator {
    /// Create an empty correlator
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Record an intercepted request body.
    ///
    /// Unparsable bodies are logged and discarded without opening a round
    /// trip. A second request on a flow that already has one pending is a
    /// protocol violation; it is logged and the new request replaces the
    /// old. Last-request-wins is a deliberate limitation, not a queue.
    pub fn on_request_body(&mut self, flow: FlowId, raw: &[u8]) {
        let parsed: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse request body on flow {} as JSON: {}", flow, e);
                return;
            }
        };

        // Typed view just to pull out the fields the engine dispatches on
        let request: ApiRequest = match serde_json::from_value(parsed.clone()) {
            Ok(request) => request,
            Err(e) => {
                warn!("Request on flow {} is not a chat completion request: {}", flow, e);
                return;
            }
        };

        debug!(
            "Pending request on flow {}: model={}, stream={}",
            flow, request.model, request.stream
        );

        if self
            .pending
            .insert(
                flow,
                PendingRequest {
                    raw: parsed,
                    stream: request.stream,
                },
            )
            .is_some()
        {
            warn!(
                "Overlapping request on flow {}: previous pending request replaced (last-request-wins)",
                flow
            );
        }
    }

    /// Pair an intercepted response with its pending request.
    ///
    /// A response on a flow with no pending request is the fatal
    /// orphaned-response error. Dispatches to the streaming assembler or
    /// the buffered parser based on the `stream` flag captured from the
    /// request, clears the pending entry, and returns the round trip for
    /// appending to history and optional delivery.
    pub fn on_response_body(
        &mut self,
        flow: FlowId,
        raw: &[u8],
        content_type: &str,
    ) -> MonitorResult<RoundTrip> {
        let pending = self
            .pending
            .remove(&flow)
            .ok_or(MonitorError::OrphanedResponse(flow))?;

        if raw.is_empty() {
            return Err(helpers::malformed(format!(
                "empty response body on flow {}",
                flow
            )));
        }

        let response = if pending.stream {
            if !content_type.contains("text/event-stream") {
                debug!(
                    "Flow {} asked for streaming but got Content-Type '{}'",
                    flow, content_type
                );
            }
            let body = std::str::from_utf8(raw)
                .map_err(|e| helpers::malformed(format!("response body is not UTF-8: {}", e)))?;
            assemble_stream_response(&pending.raw, body)?
        } else {
            let parsed: ApiResponse = serde_json::from_slice(raw).map_err(|e| {
                helpers::malformed(format!("failed to parse response on flow {}: {}", flow, e))
            })?;
            ExchangeResponse::from(parsed)
        };

        debug!(
            "Completed round trip on flow {}: model={}, total_tokens={}",
            flow, response.model, response.usage.total_tokens
        );

        Ok(RoundTrip::new(pending.raw, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_body(stream: bool) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "model": "gpt-3.5-turbo",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": stream
        }))
        .unwrap()
    }

    fn response_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "model": "gpt-3.5-turbo",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap()
    }

    #[test]
    fn test_buffered_round_trip() {
        let mut correlator = FlowCorrelator::new();
        correlator.on_request_body(0, &request_body(false));
        assert_eq!(correlator.pending_count(), 1);

        let rt = correlator
            .on_response_body(0, &response_body(), "application/json")
            .unwrap();
        assert_eq!(rt.response.usage.total_tokens, 15);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_orphaned_response_is_fatal() {
        let mut correlator = FlowCorrelator::new();
        let err = correlator
            .on_response_body(7, &response_body(), "application/json")
            .unwrap_err();
        assert!(matches!(err, MonitorError::OrphanedResponse(7)));
    }

    #[test]
    fn test_malformed_request_opens_nothing() {
        let mut correlator = FlowCorrelator::new();
        correlator.on_request_body(0, b"not json at all");
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_last_request_wins_on_overlap() {
        let mut correlator = FlowCorrelator::new();
        correlator.on_request_body(0, &request_body(false));
        let second = serde_json::to_vec(&json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "second"}]
        }))
        .unwrap();
        correlator.on_request_body(0, &second);
        assert_eq!(correlator.pending_count(), 1);

        let rt = correlator
            .on_response_body(0, &response_body(), "application/json")
            .unwrap();
        // The surviving request is the second one
        assert_eq!(rt.request["model"], "gpt-4");
    }

    #[test]
    fn test_distinct_flows_do_not_interfere() {
        let mut correlator = FlowCorrelator::new();
        correlator.on_request_body(1, &request_body(false));
        correlator.on_request_body(2, &request_body(false));
        assert_eq!(correlator.pending_count(), 2);

        correlator
            .on_response_body(2, &response_body(), "application/json")
            .unwrap();
        assert_eq!(correlator.pending_count(), 1);
        correlator
            .on_response_body(1, &response_body(), "application/json")
            .unwrap();
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_streamed_dispatch() {
        let mut correlator = FlowCorrelator::new();
        correlator.on_request_body(0, &request_body(true));

        let body = concat!(
            r#"data: {"model":"gpt-3.5-turbo","choices":[{"delta":{"content":"hey"}}]}"#,
            "\ndata: [DONE]\n"
        );
        let rt = correlator
            .on_response_body(0, body.as_bytes(), "text/event-stream")
            .unwrap();
        assert_eq!(rt.response.messages[0].content, "hey");
        assert!(rt.response.usage.prompt_tokens > 0);
    }

    #[test]
    fn test_empty_response_body_is_malformed() {
        let mut correlator = FlowCorrelator::new();
        correlator.on_request_body(0, &request_body(false));
        let err = correlator
            .on_response_body(0, b"", "application/json")
            .unwrap_err();
        assert!(matches!(err, MonitorError::MalformedPayload(_)));
    }
}
