//! Monitoring session data models
//!
//! A session produces one conversation: the ordered round trips the
//! monitored program exchanged with the API, plus the derived usage
//! summary computed at finalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::config::pricing::PricingRule;
use crate::models::api::{ApiMessage, ExchangeResponse, TokenUsage};

/// One correlated request/response exchange
///
/// Immutable once appended to the history; the request is kept as raw
/// JSON for export and prompt token auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTrip {
    /// Request body as sent by the monitored program
    pub request: Value,
    /// Normalized response
    pub response: ExchangeResponse,
    /// Arrival time of the response
    pub timestamp: DateTime<Utc>,
}

impl RoundTrip {
    /// Pair a request with its normalized response, stamped now
    pub fn new(request: Value, response: ExchangeResponse) -> Self {
        Self {
            request,
            response,
            timestamp: Utc::now(),
        }
    }
}

/// The full ordered round-trip sequence for one monitoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Session identifier
    pub id: Uuid,
    /// Round trips in arrival order
    pub round_trips: Vec<RoundTrip>,
}

impl Conversation {
    /// Create an empty conversation with a fresh id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            round_trips: Vec::new(),
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated token counts across a conversation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenTotals {
    /// Prompt tokens across all round trips
    pub prompt: u64,
    /// Completion tokens across all round trips
    pub completion: u64,
    /// Total tokens across all round trips
    pub total: u64,
}

impl TokenTotals {
    /// Fold one usage record into the totals
    pub fn add(&mut self, usage: &TokenUsage) {
        self.prompt += usage.prompt_tokens;
        self.completion += usage.completion_tokens;
        self.total += usage.total_tokens;
    }
}

/// Per-round-trip cost record kept for auditability and export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Model that served the round trip
    pub model: String,
    /// Usage for this round trip
    pub usage: TokenUsage,
    /// Cost for this round trip
    pub cost: f64,
    /// Assembled assistant messages
    pub messages: Vec<ApiMessage>,
}

/// Derived usage/cost summary for a conversation
///
/// Recomputable at any time from a conversation and a pricing table;
/// never the source of truth. Costs are plain floating point; round at
/// presentation time if currency-exact values are needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Conversation this summary was computed from
    pub conversation_id: Uuid,
    /// Total cost across all round trips
    pub total_cost: f64,
    /// Aggregated token counts
    pub total_usage: TokenTotals,
    /// Distinct models seen
    pub models: BTreeSet<String>,
    /// Pricing rules actually applied, keyed by model
    pub pricing_snapshot: BTreeMap<String, PricingRule>,
    /// One cost breakdown per round trip, in arrival order
    pub raw_data: Vec<CostBreakdown>,
}

impl UsageSummary {
    /// Merge another summary into this one.
    ///
    /// Summarization is additive over non-overlapping histories: costs
    /// and token totals add, model sets and pricing snapshots union,
    /// breakdowns concatenate. The conversation id of `self` wins.
    pub fn merge(mut self, other: UsageSummary) -> Self {
        self.total_cost += other.total_cost;
        self.total_usage.prompt += other.total_usage.prompt;
        self.total_usage.completion += other.total_usage.completion;
        self.total_usage.total += other.total_usage.total;
        self.models.extend(other.models);
        self.pricing_snapshot.extend(other.pricing_snapshot);
        self.raw_data.extend(other.raw_data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_round_trip() -> RoundTrip {
        RoundTrip::new(
            json!({"model": "gpt-4", "messages": []}),
            ExchangeResponse {
                model: "gpt-4".to_string(),
                messages: vec![ApiMessage::assistant("hello")],
                usage: TokenUsage::from_parts(10, 5),
            },
        )
    }

    #[test]
    fn test_conversation_ids_are_unique() {
        assert_ne!(Conversation::new().id, Conversation::new().id);
    }

    #[test]
    fn test_token_totals_add() {
        let mut totals = TokenTotals::default();
        totals.add(&TokenUsage::from_parts(100, 50));
        totals.add(&TokenUsage::from_parts(10, 5));
        assert_eq!(totals.prompt, 110);
        assert_eq!(totals.completion, 55);
        assert_eq!(totals.total, 165);
    }

    #[test]
    fn test_round_trip_serialization() {
        let rt = sample_round_trip();
        let json = serde_json::to_string(&rt).unwrap();
        let back: RoundTrip = serde_json::from_str(&json).unwrap();
        assert_eq!(back.response.model, "gpt-4");
        assert_eq!(back.response.usage.total_tokens, 15);
    }
}
