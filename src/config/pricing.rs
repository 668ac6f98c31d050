//! Pricing table loading
//!
//! Loads the per-model pricing rules from JSON. A default table ships with
//! the binary; users can override it with a file of their own.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::api::TokenUsage;

/// Pricing table bundled into the binary
///
/// Pricing data goes out of date; users should override it via
/// `--pricing` or `~/.config/tokmeter/pricing.json` when it does.
const DEFAULT_PRICING: &str = include_str!("../../pricing.json");

/// Per-model pricing rule
///
/// Exactly one of the two shapes is valid for a model: a uniform
/// per-token price, or prices differentiated between prompt and
/// completion tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PricingRule {
    /// Differentiated prompt/completion pricing
    Differentiated {
        per_tokens: u64,
        prompt_cost: f64,
        completion_cost: f64,
    },
    /// Uniform price for all tokens
    Uniform { per_tokens: u64, cost: f64 },
}

/// Raw JSON shape, validated into [`PricingRule`]
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPricingRule {
    per_tokens: u64,
    #[serde(default)]
    cost: Option<f64>,
    #[serde(default)]
    prompt_cost: Option<f64>,
    #[serde(default)]
    completion_cost: Option<f64>,
}

impl TryFrom<RawPricingRule> for PricingRule {
    type Error = String;

    fn try_from(raw: RawPricingRule) -> Result<Self, Self::Error> {
        if raw.per_tokens == 0 {
            return Err("per_tokens must be greater than 0".to_string());
        }
        match (raw.cost, raw.prompt_cost, raw.completion_cost) {
            (Some(cost), None, None) => Ok(PricingRule::Uniform {
                per_tokens: raw.per_tokens,
                cost,
            }),
            (None, Some(prompt_cost), Some(completion_cost)) => Ok(PricingRule::Differentiated {
                per_tokens: raw.per_tokens,
                prompt_cost,
                completion_cost,
            }),
            _ => Err(
                "pricing rule must have either 'cost' or both 'prompt_cost' and 'completion_cost'"
                    .to_string(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for PricingRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawPricingRule::deserialize(deserializer)?;
        PricingRule::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl PricingRule {
    /// Price a usage record with this rule
    pub fn cost_for(&self, usage: &TokenUsage) -> f64 {
        match self {
            PricingRule::Differentiated {
                per_tokens,
                prompt_cost,
                completion_cost,
            } => {
                cost_for_tokens(usage.prompt_tokens, *prompt_cost, *per_tokens)
                    + cost_for_tokens(usage.completion_tokens, *completion_cost, *per_tokens)
            }
            PricingRule::Uniform { per_tokens, cost } => {
                cost_for_tokens(usage.total_tokens, *cost, *per_tokens)
            }
        }
    }
}

fn cost_for_tokens(tokens: u64, price: f64, per_tokens: u64) -> f64 {
    (tokens as f64 / per_tokens as f64) * price
}

/// Mapping from model identifier to its pricing rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingTable(BTreeMap<String, PricingRule>);

impl PricingTable {
    /// Parse a pricing table from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let table: PricingTable =
            serde_json::from_str(json).context("Failed to parse pricing table JSON")?;
        if table.0.is_empty() {
            anyhow::bail!("Pricing table contains no models");
        }
        Ok(table)
    }

    /// Load a pricing table from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pricing file {}", path.display()))?;
        let table = Self::from_json(&json)
            .with_context(|| format!("Invalid pricing file {}", path.display()))?;
        info!("Loaded pricing table from {}", path.display());
        Ok(table)
    }

    /// Load the pricing table, preferring an explicit file, then the user
    /// config directory, then the bundled default.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = user_pricing_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        debug!("Using bundled pricing table");
        Self::from_json(DEFAULT_PRICING).context("Bundled pricing table is invalid")
    }

    /// Look up the rule for a model
    pub fn get(&self, model: &str) -> Option<&PricingRule> {
        self.0.get(model)
    }

    /// Number of priced models
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn insert(&mut self, model: impl Into<String>, rule: PricingRule) {
        self.0.insert(model.into(), rule);
    }
}

/// Location of the user-level pricing override
fn user_pricing_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tokmeter").join("pricing.json"))
}
