//! Chat API data models
//!
//! Defines the wire structures the monitored program exchanges with the
//! chat completion API, plus the normalized response the engine stores.

use serde::{Deserialize, Serialize};

/// Chat completion request as seen on the wire
///
/// Only the fields the engine cares about are typed; the full body is kept
/// alongside as raw JSON for prompt token counting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Model name
    pub model: String,
    /// Message list
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
    /// Whether the caller asked for a streamed (SSE) response
    #[serde(default)]
    pub stream: bool,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiMessage {
    /// Role (system/user/assistant)
    pub role: String,
    /// Message content
    pub content: String,
}

impl ApiMessage {
    /// Build an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Token usage statistics as reported (or reconstructed) per exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Prompt token count
    pub prompt_tokens: u64,
    /// Completion token count
    pub completion_tokens: u64,
    /// Total token count
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build usage with total derived from the parts
    pub fn from_parts(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Buffered (non-streaming) chat completion response as seen on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Model that produced the completion
    pub model: String,
    /// Choice list
    pub choices: Vec<ApiChoice>,
    /// Usage statistics (the API always reports them when not streaming)
    pub usage: TokenUsage,
}

/// A single response choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiChoice {
    /// Message content
    pub message: ApiMessage,
    /// Finish reason (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One SSE chunk of a streamed chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Model that produced the chunk
    pub model: String,
    /// Choice list
    pub choices: Vec<StreamChoice>,
}

/// A single streamed choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    /// Delta content
    #[serde(default)]
    pub delta: StreamDelta,
    /// Finish reason (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Incremental delta inside a streamed choice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Role (first chunk only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content fragment (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Normalized response stored in a round trip
///
/// Both the buffered and the streamed paths reduce to this shape: the
/// model, the assembled assistant message(s), and a usage object whose
/// invariant (total == prompt + completion) is enforced at pricing time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// Model that produced the completion
    pub model: String,
    /// Assembled assistant messages
    pub messages: Vec<ApiMessage>,
    /// Reported or reconstructed usage
    pub usage: TokenUsage,
}

impl From<ApiResponse> for ExchangeResponse {
    fn from(resp: ApiResponse) -> Self {
        let messages = resp
            .choices
            .into_iter()
            .map(|choice| choice.message)
            .collect();
        Self {
            model: resp.model,
            messages,
            usage: resp.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let body = r#"{
            "model": "gpt-3.5-turbo",
            "messages": [{"role": "user", "content": "Hello"}],
            "stream": true,
            "temperature": 0.7
        }"#;
        let request: ApiRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert!(request.stream);
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_stream_flag_defaults_to_false() {
        let body = r#"{"model": "gpt-4", "messages": []}"#;
        let request: ApiRequest = serde_json::from_str(body).unwrap();
        assert!(!request.stream);
    }

    #[test]
    fn test_response_normalization() {
        let resp = ApiResponse {
            model: "gpt-4".to_string(),
            choices: vec![ApiChoice {
                message: ApiMessage::assistant("Hi there"),
                finish_reason: Some("stop".to_string()),
            }],
            usage: TokenUsage::from_parts(10, 5),
        };
        let normalized: ExchangeResponse = resp.into();
        assert_eq!(normalized.model, "gpt-4");
        assert_eq!(normalized.messages[0].content, "Hi there");
        assert_eq!(normalized.usage.total_tokens, 15);
    }

    #[test]
    fn test_usage_from_parts() {
        let usage = TokenUsage::from_parts(100, 50);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn test_stream_chunk_deserialization() {
        let chunk = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-3.5-turbo",
            "choices": [{"delta": {"content": "Hel"}, "finish_reason": null}]
        }"#;
        let parsed: StreamChunk = serde_json::from_str(chunk).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hel"));
    }
}
