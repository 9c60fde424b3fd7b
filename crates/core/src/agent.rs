//! Run-level state shared by the agent loop and telemetry.

use serde::{Deserialize, Serialize};

/// Why a round promise marks the end of a run.
///
/// Every promise except the last carries [`TerminationReason::None`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The run continues after this round.
    #[default]
    None,
    /// The iteration limit was reached.
    MaxIterations,
    /// A tool asked the loop to stop.
    TerminationRequested,
    /// The model answered without asking for tools.
    TaskCompleted,
}

impl TerminationReason {
    /// True for every reason except [`TerminationReason::None`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::MaxIterations => "max_iterations",
            Self::TerminationRequested => "termination_requested",
            Self::TaskCompleted => "task_completed",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
