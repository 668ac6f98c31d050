//! JSON token counting tests
//!
//! The payload counter must be insensitive to structural ordering and
//! must never charge for object keys.

use serde_json::json;

use tokmeter::utils::tokenizer::{count_json_tokens, Tokenizer};

fn tokenizer() -> Tokenizer {
    Tokenizer::for_model("gpt-3.5-turbo")
}

#[test]
fn object_key_order_does_not_change_the_count() {
    let tokenizer = tokenizer();
    let a = json!({
        "model": "gpt-3.5-turbo",
        "messages": [{"role": "user", "content": "What is the capital of France?"}],
        "temperature": 0.7,
    });
    let b = json!({
        "temperature": 0.7,
        "messages": [{"content": "What is the capital of France?", "role": "user"}],
        "model": "gpt-3.5-turbo",
    });
    assert_eq!(
        count_json_tokens(&tokenizer, &a),
        count_json_tokens(&tokenizer, &b)
    );
}

#[test]
fn keys_are_excluded_from_the_count() {
    let tokenizer = tokenizer();
    let short_keys = json!({"a": "hello world", "b": "goodbye"});
    let long_keys = json!({
        "an extremely long and verbose key name": "hello world",
        "another equally long-winded key": "goodbye",
    });
    assert_eq!(
        count_json_tokens(&tokenizer, &short_keys),
        count_json_tokens(&tokenizer, &long_keys)
    );
}

#[test]
fn array_order_permutations_count_the_same() {
    let tokenizer = tokenizer();
    let forward = json!(["alpha", "beta", "gamma"]);
    let backward = json!(["gamma", "beta", "alpha"]);
    assert_eq!(
        count_json_tokens(&tokenizer, &forward),
        count_json_tokens(&tokenizer, &backward)
    );
}

#[test]
fn scalars_contribute_their_serialized_text() {
    let tokenizer = tokenizer();
    assert_eq!(
        count_json_tokens(&tokenizer, &json!("hello")),
        tokenizer.count("hello")
    );
    assert_eq!(
        count_json_tokens(&tokenizer, &json!(12345)),
        tokenizer.count("12345")
    );
    assert_eq!(
        count_json_tokens(&tokenizer, &json!(true)),
        tokenizer.count("true")
    );
    assert_eq!(
        count_json_tokens(&tokenizer, &json!(null)),
        tokenizer.count("null")
    );
}

#[test]
fn empty_containers_count_zero() {
    let tokenizer = tokenizer();
    assert_eq!(count_json_tokens(&tokenizer, &json!({})), 0);
    assert_eq!(count_json_tokens(&tokenizer, &json!([])), 0);
    assert_eq!(count_json_tokens(&tokenizer, &json!({"a": [], "b": {}})), 0);
}

#[test]
fn nesting_depth_does_not_change_leaf_counts() {
    let tokenizer = tokenizer();
    let flat = json!(["one", "two"]);
    let nested = json!({"outer": {"inner": ["one", {"deep": "two"}]}});
    assert_eq!(
        count_json_tokens(&tokenizer, &flat),
        count_json_tokens(&tokenizer, &nested)
    );
}

#[test]
fn unknown_models_still_tokenize_via_fallback() {
    let tokenizer = Tokenizer::for_model("some-model-nobody-has-heard-of");
    assert!(tokenizer.count("hello world") > 0);
}
