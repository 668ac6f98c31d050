//! Cost calculation
//!
//! Prices round trips against the pricing table and reduces a history
//! into a usage summary. Pricing gaps and usage-invariant violations are
//! surfaced to the caller; a partially-wrong total is never produced.

use tracing::debug;
use uuid::Uuid;

use crate::config::pricing::{PricingRule, PricingTable};
use crate::models::session::{CostBreakdown, RoundTrip, TokenTotals, UsageSummary};
use crate::utils::error::{MonitorError, MonitorResult};

/// Prices round trips and summarizes conversations
#[derive(Debug, Clone)]
pub struct CostCalculator {
    pricing: PricingTable,
}

impl CostCalculator {
    /// Create a calculator over a pricing table
    pub fn new(pricing: PricingTable) -> Self {
        Self { pricing }
    }

    /// The pricing table this calculator applies
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Price a single round trip.
    ///
    /// Fails if the model is unpriced or the usage invariant
    /// `total == prompt + completion` does not hold. Costs stay in
    /// floating point; round at presentation time.
    pub fn price_round_trip(
        &self,
        round_trip: &RoundTrip,
    ) -> MonitorResult<(PricingRule, CostBreakdown)> {
        let usage = &round_trip.response.usage;
        let model = &round_trip.response.model;

        if usage.total_tokens != usage.prompt_tokens + usage.completion_tokens {
            return Err(MonitorError::UsageInvariant {
                prompt: usage.prompt_tokens,
                completion: usage.completion_tokens,
                total: usage.total_tokens,
            });
        }

        let rule = self
            .pricing
            .get(model)
            .ok_or_else(|| MonitorError::ModelNotPriced(model.clone()))?;

        let cost = rule.cost_for(usage);
        debug!("Priced round trip: model={}, tokens={}, cost={}", model, usage.total_tokens, cost);

        Ok((
            rule.clone(),
            CostBreakdown {
                model: model.clone(),
                usage: *usage,
                cost,
                messages: round_trip.response.messages.clone(),
            },
        ))
    }

    /// Reduce a round-trip sequence into a usage summary.
    ///
    /// Returns `Ok(None)` for an empty sequence so callers report "no
    /// API calls detected" instead of a zero-valued summary. Any pricing
    /// failure aborts the whole summarization.
    pub fn summarize(
        &self,
        conversation_id: Uuid,
        round_trips: &[RoundTrip],
    ) -> MonitorResult<Option<UsageSummary>> {
        if round_trips.is_empty() {
            return Ok(None);
        }

        let mut summary = UsageSummary {
            conversation_id,
            total_cost: 0.0,
            total_usage: TokenTotals::default(),
            models: Default::default(),
            pricing_snapshot: Default::default(),
            raw_data: Vec::with_capacity(round_trips.len()),
        };

        for round_trip in round_trips {
            let (rule, breakdown) = self.price_round_trip(round_trip)?;
            summary.total_cost += breakdown.cost;
            summary.total_usage.add(&breakdown.usage);
            summary.models.insert(breakdown.model.clone());
            summary
                .pricing_snapshot
                .insert(breakdown.model.clone(), rule);
            summary.raw_data.push(breakdown);
        }

        debug!(
            "Summarized {} round trips: total_cost={}, total_tokens={}",
            round_trips.len(),
            summary.total_cost,
            summary.total_usage.total
        );

        Ok(Some(summary))
    }
}
