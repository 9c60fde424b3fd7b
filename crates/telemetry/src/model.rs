//! Data model for run statistics and the end-of-run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use toolrun_core::TokenUsage;

// ── Records ───────────────────────────────────────────────────────────────

/// One successful model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Provider that served the call.
    pub provider: String,
    /// Model that actually responded.
    pub model: String,
    pub usage: TokenUsage,
    /// Cost in USD; `None` when untracked.
    pub cost_usd: Option<f64>,
    /// Tool calls the model requested.
    pub tool_calls: usize,
    pub recorded_at: DateTime<Utc>,
}

/// One tool dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

// ── Per-context stats ─────────────────────────────────────────────────────

/// Usage accumulated under one context key. Additive only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_tokens: u64,
    /// Sum of every tracked generation cost in USD.
    pub cost_usd: f64,
    pub generations: Vec<GenerationRecord>,
    pub tool_invocations: Vec<ToolInvocationRecord>,
}

impl ContextStats {
    pub(crate) fn add_usage(&mut self, usage: &TokenUsage) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.reasoning_tokens += usage.reasoning_tokens;
        self.cached_tokens += usage.cached_tokens;
    }

    /// Share of input tokens served from the prompt cache.
    pub fn cached_ratio(&self) -> f64 {
        cached_ratio(self.cached_tokens, self.input_tokens)
    }

    /// Invocation count for one tool in this context.
    pub fn tool_invocation_count(&self, tool_name: &str) -> usize {
        self.tool_invocations
            .iter()
            .filter(|r| r.tool_name == tool_name)
            .count()
    }
}

pub(crate) fn cached_ratio(cached: u64, input: u64) -> f64 {
    if input == 0 {
        0.0
    } else {
        cached as f64 / input as f64
    }
}

// ── Summary ───────────────────────────────────────────────────────────────

/// Totals across every context, as reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub generations: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_tokens: u64,
    pub cached_ratio: f64,
    /// Whether any generation came from a backend that bills per token.
    pub tracks_cost: bool,
    pub cost_by_context: BTreeMap<String, f64>,
    pub tool_invocations: BTreeMap<String, u64>,
    /// Context key that a single-context report collapses to.
    pub default_context: String,
}

impl RunSummary {
    pub fn total_cost(&self) -> f64 {
        self.cost_by_context.values().sum()
    }

    pub fn uncached_input_tokens(&self) -> u64 {
        self.input_tokens.saturating_sub(self.cached_tokens)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", "=".repeat(70))?;
        writeln!(f, "# Summary {}", "#".repeat(57))?;
        writeln!(f, "Total messages: {}", self.generations)?;
        writeln!(f, "Total input tokens: {}", self.input_tokens)?;
        writeln!(f, "Total output tokens: {}", self.output_tokens)?;
        writeln!(f, "Total reasoning tokens: {}", self.reasoning_tokens)?;
        writeln!(f, "Total cached tokens: {}", self.cached_tokens)?;
        writeln!(f, "Total uncached input tokens: {}", self.uncached_input_tokens())?;
        writeln!(f, "Cached tokens hit ratio: {:.2}%", self.cached_ratio * 100.0)?;

        if !self.tracks_cost {
            writeln!(f, "Total cost: N/A")?;
        } else if self.cost_by_context.len() == 1
            && self.cost_by_context.contains_key(&self.default_context)
        {
            writeln!(f, "Total cost: {:.4} USD", self.total_cost())?;
        } else {
            for (context, cost) in &self.cost_by_context {
                writeln!(f, "  - {context}: {cost:.4} USD")?;
            }
            writeln!(f, "Total cost: {:.4} USD", self.total_cost())?;
        }

        writeln!(f, "Tool invocation counts:")?;
        if self.tool_invocations.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (tool, count) in &self.tool_invocations {
            writeln!(f, "  - {tool}: {count}")?;
        }
        write!(f, "{}", "#".repeat(56))
    }
}
