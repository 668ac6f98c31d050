//! Streaming response assembly
//!
//! The upstream API reports no usage object for streamed responses, so
//! token counts are reconstructed locally: completion tokens by running
//! the model's tokenizer over each delta, prompt tokens by walking the
//! original request JSON. The counts are an approximation calibrated
//! against the API's non-streaming numbers (object keys excluded).

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::api::{ApiMessage, ExchangeResponse, StreamChunk, TokenUsage};
use crate::utils::error::{helpers, MonitorResult};
use crate::utils::tokenizer::{count_json_tokens, Tokenizer};

/// SSE line prefix carrying a payload
const DATA_PREFIX: &str = "data:";

/// Stream terminator payload
const DONE_MARKER: &str = "[DONE]";

/// Reconstruct a normalized response from a fully buffered SSE body.
///
/// `request` is the original pending request; its `model` field is the
/// fallback when no chunk parses, and its JSON tree is the prompt-token
/// source. Lines that are not valid JSON are skipped; a line that parses
/// as JSON but is not a completion chunk aborts the whole response,
/// since it means the stream is not what the request negotiated.
pub fn assemble_stream_response(request: &Value, body: &str) -> MonitorResult<ExchangeResponse> {
    let mut model: Option<String> = None;
    let mut tokenizer: Option<Tokenizer> = None;
    let mut completion = String::new();
    let mut completion_tokens = 0u64;

    for line in body.lines() {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        let payload = payload.trim();

        if payload == DONE_MARKER {
            break;
        }

        // Syntax errors skip the line; shape errors on valid JSON are
        // fatal to the whole response
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping unparsable SSE chunk ({}): {}", e, payload);
                continue;
            }
        };
        let chunk: StreamChunk = serde_json::from_value(value).map_err(|e| {
            helpers::malformed(format!("SSE payload is not a completion chunk ({}): {}", e, payload))
        })?;

        if model.is_none() {
            model = Some(chunk.model.clone());
        }
        let tokenizer = tokenizer.get_or_insert_with(|| Tokenizer::for_model(&chunk.model));

        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = &choice.delta.content {
                completion_tokens += tokenizer.count(content);
                completion.push_str(content);
            }
        }
    }

    // A stream that carried no parsable chunk still has the model on the
    // request side; without that, nothing can be tokenized.
    let model = match model.or_else(|| {
        request
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string)
    }) {
        Some(model) => model,
        None => {
            return Err(helpers::malformed(
                "streamed response carried no model and the request has none either",
            ));
        }
    };

    let tokenizer = tokenizer.unwrap_or_else(|| Tokenizer::for_model(&model));
    let prompt_tokens = count_json_tokens(&tokenizer, request);
    let usage = TokenUsage::from_parts(prompt_tokens, completion_tokens);

    debug!(
        "Assembled streamed response: model={}, prompt={}, completion={}",
        model, usage.prompt_tokens, usage.completion_tokens
    );

    Ok(ExchangeResponse {
        model,
        messages: vec![ApiMessage::assistant(completion)],
        usage,
    })
}
