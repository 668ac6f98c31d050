//! Tokenizer adapter and JSON token counting
//!
//! Wraps tiktoken so the rest of the engine can count tokens the same way
//! the upstream API bills them. Tokenizers are cached per model because
//! building a BPE table is expensive.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};
use tracing::{debug, warn};

/// Process-wide tokenizer cache, keyed by model identifier
static TOKENIZERS: Lazy<Mutex<HashMap<String, Tokenizer>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Model-bound tokenizer handle
///
/// Cheap to clone; the underlying BPE table is shared.
#[derive(Clone)]
pub struct Tokenizer {
    model: String,
    bpe: Arc<CoreBPE>,
}

impl Tokenizer {
    /// Get the tokenizer for a model, building and caching it on first use.
    ///
    /// Models tiktoken does not know fall back to cl100k_base, which is
    /// close enough for the modern chat models this tool monitors.
    pub fn for_model(model: &str) -> Self {
        let mut cache = TOKENIZERS.lock().expect("tokenizer cache poisoned");
        if let Some(tokenizer) = cache.get(model) {
            return tokenizer.clone();
        }

        let bpe = match get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                warn!("No tokenizer registered for model '{}' ({}), falling back to cl100k_base", model, e);
                cl100k_base().expect("cl100k_base tokenizer should always build")
            }
        };

        debug!("Initialized tokenizer for model {}", model);
        let tokenizer = Self {
            model: model.to_string(),
            bpe: Arc::new(bpe),
        };
        cache.insert(model.to_string(), tokenizer.clone());
        tokenizer
    }

    /// Model identifier this tokenizer is bound to
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of tokens in the given text
    pub fn count(&self, text: &str) -> u64 {
        self.bpe.encode_ordinary(text).len() as u64
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("model", &self.model)
            .finish()
    }
}

/// Count the tokens of every string/scalar leaf in a JSON value.
///
/// Uses an explicit work list rather than recursion so deeply nested
/// request bodies cannot blow the stack. Object keys are excluded:
/// empirically they are not counted towards the API's prompt token count.
/// Accumulation is commutative, so traversal order never changes the sum.
pub fn count_json_tokens(tokenizer: &Tokenizer, value: &Value) -> u64 {
    let mut token_count = 0u64;
    let mut stack = vec![value];

    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                stack.extend(map.values());
            }
            Value::Array(items) => {
                stack.extend(items.iter());
            }
            Value::String(s) => {
                token_count += tokenizer.count(s);
            }
            other => {
                token_count += tokenizer.count(&other.to_string());
            }
        }
    }

    token_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_basic() {
        let tokenizer = Tokenizer::for_model("gpt-3.5-turbo");
        let tokens = tokenizer.count("Hello, world!");
        assert!(tokens > 0);
        assert!(tokens < 10);
        assert_eq!(tokenizer.count(""), 0);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let tokenizer = Tokenizer::for_model("totally-made-up-model");
        assert!(tokenizer.count("hello world") > 0);
        assert_eq!(tokenizer.model(), "totally-made-up-model");
    }

    #[test]
    fn test_cache_returns_same_table() {
        let a = Tokenizer::for_model("gpt-4");
        let b = Tokenizer::for_model("gpt-4");
        assert!(Arc::ptr_eq(&a.bpe, &b.bpe));
    }

    #[test]
    fn test_json_count_excludes_keys() {
        let tokenizer = Tokenizer::for_model("gpt-3.5-turbo");
        let with_short_keys = json!({"a": "hello world"});
        let with_long_keys = json!({"a_very_long_and_descriptive_key_name": "hello world"});
        assert_eq!(
            count_json_tokens(&tokenizer, &with_short_keys),
            count_json_tokens(&tokenizer, &with_long_keys)
        );
    }

    #[test]
    fn test_json_count_scalars_stringified() {
        let tokenizer = Tokenizer::for_model("gpt-3.5-turbo");
        assert_eq!(
            count_json_tokens(&tokenizer, &json!(42)),
            tokenizer.count("42")
        );
        assert_eq!(
            count_json_tokens(&tokenizer, &json!(true)),
            tokenizer.count("true")
        );
    }

    #[test]
    fn test_json_count_nested_sum() {
        let tokenizer = Tokenizer::for_model("gpt-3.5-turbo");
        let value = json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                {"role": "user", "content": "What is the capital of France?"}
            ],
            "stream": true
        });
        let expected = tokenizer.count("gpt-3.5-turbo")
            + tokenizer.count("user")
            + tokenizer.count("What is the capital of France?")
            + tokenizer.count("true");
        assert_eq!(count_json_tokens(&tokenizer, &value), expected);
    }

    #[test]
    fn test_json_count_deep_nesting() {
        let tokenizer = Tokenizer::for_model("gpt-3.5-turbo");
        let mut value = json!("leaf");
        for _ in 0..5000 {
            value = json!([value]);
        }
        assert_eq!(count_json_tokens(&tokenizer, &value), tokenizer.count("leaf"));
    }
}
