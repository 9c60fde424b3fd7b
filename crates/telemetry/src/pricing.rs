//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per [`BASE`] (1 million) tokens. Each model has an
//! input, output and cached-input price. Custom pricing can be added at
//! runtime from the TOML config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use toolrun_core::TokenUsage;

/// Per-million-token normalization constant.
pub const BASE: f64 = 1_000_000.0;

/// Provider prefixes tried when a bare model name has no exact entry.
const PROVIDER_PREFIXES: &[&str] = &[
    "openai",
    "azure",
    "anthropic",
    "google",
    "mistral",
    "deepseek",
    "meta-llama",
];

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M uncached input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
    /// Price per 1M input tokens served from the prompt cache. Falls back to
    /// `input_per_m` when the model has no cache discount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_per_m: Option<f64>,
}

impl ModelPricing {
    /// Create a new pricing entry without a cache discount.
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
            cached_input_per_m: None,
        }
    }

    pub fn with_cached(mut self, cached_input_per_m: f64) -> Self {
        self.cached_input_per_m = Some(cached_input_per_m);
        self
    }

    /// Compute cost for one generation's token usage.
    ///
    /// Cached tokens are a subset of input tokens and are billed at the
    /// cached rate only.
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        let cached = usage.cached_tokens.min(usage.input_tokens);
        let uncached = usage.input_tokens - cached;
        let cached_price = self.cached_input_per_m.unwrap_or(self.input_per_m);

        uncached as f64 / BASE * self.input_per_m
            + usage.output_tokens as f64 / BASE * self.output_per_m
            + cached as f64 / BASE * cached_price
    }
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // ── OpenAI ─────────────────────────────────────────────────
        prices.insert("openai/gpt-4o".into(), ModelPricing::new(2.5, 10.0).with_cached(1.25));
        prices.insert("openai/gpt-4o-mini".into(), ModelPricing::new(0.15, 0.6).with_cached(0.075));
        prices.insert("openai/gpt-4.1".into(), ModelPricing::new(2.0, 8.0).with_cached(0.5));
        prices.insert("openai/gpt-4.1-mini".into(), ModelPricing::new(0.4, 1.6).with_cached(0.1));
        prices.insert("openai/gpt-4.1-nano".into(), ModelPricing::new(0.1, 0.4).with_cached(0.025));
        prices.insert("openai/o1".into(), ModelPricing::new(15.0, 60.0).with_cached(7.5));
        prices.insert("openai/o3".into(), ModelPricing::new(2.0, 8.0).with_cached(0.5));
        prices.insert("openai/o3-mini".into(), ModelPricing::new(1.1, 4.4).with_cached(0.55));
        prices.insert("openai/o4-mini".into(), ModelPricing::new(1.1, 4.4).with_cached(0.275));

        // ── Anthropic ──────────────────────────────────────────────
        prices.insert(
            "anthropic/claude-sonnet-4".into(),
            ModelPricing::new(3.0, 15.0).with_cached(0.3),
        );
        prices.insert(
            "anthropic/claude-opus-4".into(),
            ModelPricing::new(15.0, 75.0).with_cached(1.5),
        );
        prices.insert(
            "anthropic/claude-3.5-haiku".into(),
            ModelPricing::new(0.8, 4.0).with_cached(0.08),
        );

        // ── Google ─────────────────────────────────────────────────
        prices.insert("google/gemini-2.0-flash".into(), ModelPricing::new(0.1, 0.4));
        prices.insert("google/gemini-1.5-pro".into(), ModelPricing::new(1.25, 5.0));

        // ── Mistral ────────────────────────────────────────────────
        prices.insert("mistral/mistral-large".into(), ModelPricing::new(2.0, 6.0));
        prices.insert("mistral/mistral-small".into(), ModelPricing::new(0.2, 0.6));

        // ── DeepSeek ───────────────────────────────────────────────
        prices.insert(
            "deepseek/deepseek-v3".into(),
            ModelPricing::new(0.27, 1.1).with_cached(0.07),
        );
        prices.insert(
            "deepseek/deepseek-r1".into(),
            ModelPricing::new(0.55, 2.19).with_cached(0.14),
        );

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Exact-key lookup. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap();
        prices.get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap();
        prices.insert(model.into(), pricing);
    }

    /// Apply a batch of overrides (e.g. `[telemetry.custom_pricing]`).
    pub fn extend<I>(&self, overrides: I)
    where
        I: IntoIterator<Item = (String, ModelPricing)>,
    {
        let mut prices = self.prices.write().unwrap();
        prices.extend(overrides);
    }

    /// Find the pricing entry for a model identifier.
    ///
    /// Exact key first, then the same key under a common provider prefix
    /// (`gpt-4o` → `openai/gpt-4o`). Anything else has no price.
    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap();
        if let Some(p) = prices.get(model) {
            return Some(*p);
        }

        PROVIDER_PREFIXES
            .iter()
            .find_map(|prefix| prices.get(&format!("{prefix}/{model}")).copied())
    }

    /// Compute cost for a model call.
    ///
    /// `None` when the model has no entry: untracked, which is not the same
    /// as free.
    pub fn compute_cost(&self, model: &str, usage: &TokenUsage) -> Option<f64> {
        self.lookup(model).map(|p| p.cost(usage))
    }

    /// List all known model names.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap();
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.read().unwrap().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
