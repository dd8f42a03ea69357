//! Model prices and the lookup table the gateway charges usage against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// USD per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Pricing for models that cost nothing to call (local inference).
    pub fn free() -> Self {
        Self::new(0.0, 0.0)
    }

    /// USD for one call.
    pub fn calculate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Per-model pricing, keyed by bare model name (`gpt-4o-mini`).
///
/// Lookups try the exact name first, then the longest known prefix so dated
/// snapshots (`gpt-4o-mini-2024-07-18`) share their family's price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable(BTreeMap<String, Pricing>);

impl PricingTable {
    /// Empty table; every lookup misses.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert or replace the price of a model.
    pub fn insert(&mut self, model: impl Into<String>, pricing: Pricing) {
        self.0.insert(model.into(), pricing);
    }

    /// Merge another table over this one.
    pub fn extend(&mut self, other: PricingTable) {
        self.0.extend(other.0);
    }

    /// Look up the price of a model.
    pub fn get(&self, model: &str) -> Option<&Pricing> {
        if let Some(pricing) = self.0.get(model) {
            return Some(pricing);
        }
        self.0
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, pricing)| pricing)
    }

    /// Cost of a call, zero when the model is not priced.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.get(model)
            .map(|p| p.calculate(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("gpt-4o-mini", Pricing::new(0.15, 0.60));
        table.insert("gpt-4o", Pricing::new(2.50, 10.00));
        table.insert("gpt-4.1-mini", Pricing::new(0.40, 1.60));
        table.insert("gpt-4.1", Pricing::new(2.00, 8.00));
        table.insert("gemini-1.5-flash", Pricing::new(0.075, 0.30));
        table.insert("gemini-1.5-pro", Pricing::new(1.25, 5.00));
        table.insert("gemini-2.0-flash", Pricing::new(0.10, 0.40));
        table
    }
}
