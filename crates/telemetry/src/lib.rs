//! Usage tracking, cost accounting and log setup for toolrun.
//!
//! The [`RunTracker`] aggregates token usage, cost and tool invocations per
//! context key; [`PricingTable`] turns token counts into USD with built-in
//! model prices and config overrides.

pub mod logging;
pub mod model;
pub mod pricing;
pub mod tracker;

pub use model::{ContextStats, GenerationRecord, RunSummary, ToolInvocationRecord};
pub use pricing::{ModelPricing, PricingTable, BASE};
pub use tracker::{RunTracker, DEFAULT_CONTEXT_KEY};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl RunTracker {
    /// Serialize the summary for machine consumption.
    pub fn summary_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(&self.summary())?)
    }
}
