//! Accumulates token usage, cost and tool invocations per context key, and
//! narrates the run when verbose.

use crate::model::{cached_ratio, ContextStats, GenerationRecord, RunSummary, ToolInvocationRecord};
use crate::pricing::PricingTable;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::RwLock;
use toolrun_core::{Provider, ProviderResponse, TerminationReason, ToolCall};
use tracing::{debug, info, warn};

/// Context key used when the caller does not name one.
pub const DEFAULT_CONTEXT_KEY: &str = "default";

/// Tracks one agent loop's usage.
///
/// Thread-safe via `RwLock`. Stats are additive and never reset; build a
/// new tracker to start over.
pub struct RunTracker {
    /// Pricing table for cost computation.
    pricing: PricingTable,
    /// Emit human-oriented events for every record call.
    verbose: bool,
    /// Global switch; providers still opt in through `tracks_cost`.
    track_cost: bool,
    stats: RwLock<RunStats>,
}

#[derive(Debug, Default)]
struct RunStats {
    contexts: BTreeMap<String, ContextStats>,
    tool_counts: BTreeMap<String, u64>,
    generations: u64,
    tracks_cost: bool,
}

impl RunStats {
    fn context(&mut self, key: &str) -> &mut ContextStats {
        self.contexts.entry(key.to_string()).or_default()
    }
}

impl RunTracker {
    /// Create a tracker with default pricing.
    pub fn new() -> Self {
        Self::with_pricing(PricingTable::with_defaults())
    }

    /// Create a tracker with custom pricing.
    pub fn with_pricing(pricing: PricingTable) -> Self {
        Self {
            pricing,
            verbose: false,
            track_cost: true,
            stats: RwLock::new(RunStats::default()),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_cost_tracking(mut self, enabled: bool) -> Self {
        self.track_cost = enabled;
        self
    }

    /// Get a reference to the pricing table.
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    // ── Recording ─────────────────────────────────────────────────────

    /// Account for one model response under `context_key`.
    ///
    /// Failed responses are reported and otherwise ignored.
    pub fn record_generation(&self, provider: &dyn Provider, response: &ProviderResponse, context_key: &str) {
        if !response.is_successful() {
            warn!(
                provider = provider.name(),
                model = %response.model,
                error = response.error.as_deref().unwrap_or_default(),
                "Generation failed; nothing recorded"
            );
            return;
        }

        let usage = provider.token_usage(response);
        let cost = if self.track_cost && provider.tracks_cost() {
            let cost = self.pricing.compute_cost(&response.model, &usage);
            if cost.is_none() {
                debug!(model = %response.model, "No pricing entry; cost untracked");
            }
            cost
        } else {
            None
        };

        {
            let mut stats = self.stats.write().unwrap();
            stats.generations += 1;
            if self.track_cost && provider.tracks_cost() {
                stats.tracks_cost = true;
            }

            let ctx = stats.context(context_key);
            ctx.add_usage(&usage);
            if let Some(cost) = cost {
                ctx.cost_usd += cost;
            }
            ctx.generations.push(GenerationRecord {
                provider: provider.name().to_string(),
                model: response.model.clone(),
                usage,
                cost_usd: cost,
                tool_calls: response.tool_calls().len(),
                recorded_at: Utc::now(),
            });
        }

        debug!(
            context = context_key,
            model = %response.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cached_tokens = usage.cached_tokens,
            cost_usd = cost.unwrap_or_default(),
            "Generation recorded"
        );

        if self.verbose {
            if response.tool_calls().is_empty() {
                info!(
                    thinking = response.thinking.as_deref().unwrap_or_default(),
                    "Message: {}",
                    response.content()
                );
            } else {
                info!("#{} Tool calls", response.tool_calls().len());
            }
        }
    }

    /// Count a tool dispatch under `context_key`.
    pub fn record_tool_dispatch(&self, call: &ToolCall, context_key: &str) {
        {
            let mut stats = self.stats.write().unwrap();
            *stats.tool_counts.entry(call.name().to_string()).or_default() += 1;
            stats.context(context_key).tool_invocations.push(ToolInvocationRecord {
                call_id: call.id().to_string(),
                tool_name: call.name().to_string(),
                arguments: call.arguments().clone(),
                recorded_at: Utc::now(),
            });
        }

        if self.verbose {
            info!(tool = call.name(), call_id = call.id(), arguments = %call.arguments(), "Tool call");
        }
    }

    /// Report a tool result. Presentation only.
    pub fn record_tool_result(&self, call: &ToolCall) {
        if !self.verbose {
            return;
        }
        let content = call.content().unwrap_or_default();
        if call.is_successful() {
            info!(tool = call.name(), call_id = call.id(), "Tool result: {content}");
        } else {
            warn!(tool = call.name(), call_id = call.id(), "Tool error: {content}");
        }
    }

    /// Report why the run ended. Presentation only.
    pub fn record_termination(&self, reason: TerminationReason) {
        if self.verbose {
            info!(reason = %reason, "Termination");
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Snapshot of one context's stats.
    pub fn context(&self, context_key: &str) -> Option<ContextStats> {
        self.stats.read().unwrap().contexts.get(context_key).cloned()
    }

    /// Context keys seen so far, sorted.
    pub fn context_keys(&self) -> Vec<String> {
        self.stats.read().unwrap().contexts.keys().cloned().collect()
    }

    /// Accumulated cost for one context (0.0 if unseen).
    pub fn cost(&self, context_key: &str) -> f64 {
        self.stats
            .read()
            .unwrap()
            .contexts
            .get(context_key)
            .map(|c| c.cost_usd)
            .unwrap_or(0.0)
    }

    /// Accumulated cost across all contexts.
    pub fn total_cost(&self) -> f64 {
        self.stats.read().unwrap().contexts.values().map(|c| c.cost_usd).sum()
    }

    /// Dispatches of one tool across all contexts.
    pub fn tool_invocation_count(&self, tool_name: &str) -> u64 {
        self.stats
            .read()
            .unwrap()
            .tool_counts
            .get(tool_name)
            .copied()
            .unwrap_or(0)
    }

    /// Share of input tokens served from cache, across all contexts.
    pub fn cached_ratio(&self) -> f64 {
        let stats = self.stats.read().unwrap();
        let (cached, input) = stats
            .contexts
            .values()
            .fold((0, 0), |(c, i), ctx| (c + ctx.cached_tokens, i + ctx.input_tokens));
        cached_ratio(cached, input)
    }

    /// Totals for the end-of-run report.
    pub fn summary(&self) -> RunSummary {
        let stats = self.stats.read().unwrap();
        let mut summary = RunSummary {
            generations: stats.generations,
            tracks_cost: stats.tracks_cost,
            tool_invocations: stats.tool_counts.clone(),
            default_context: DEFAULT_CONTEXT_KEY.to_string(),
            ..Default::default()
        };

        for (key, ctx) in &stats.contexts {
            summary.input_tokens += ctx.input_tokens;
            summary.output_tokens += ctx.output_tokens;
            summary.reasoning_tokens += ctx.reasoning_tokens;
            summary.cached_tokens += ctx.cached_tokens;
            if !ctx.generations.is_empty() {
                summary.cost_by_context.insert(key.clone(), ctx.cost_usd);
            }
        }
        summary.cached_ratio = cached_ratio(summary.cached_tokens, summary.input_tokens);
        summary
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}
