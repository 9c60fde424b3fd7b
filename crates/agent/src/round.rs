//! The value the agent run hands back on every pull.

use std::time::Duration;
use toolrun_core::{Message, ProviderResponse, TerminationReason, ToolCall, ToolCallError};

/// The outcome of one step of a run.
///
/// A round with k tool-call requests produces k promises, each carrying its
/// own [`ToolCall`]. Replacing the call in one promise never affects a
/// sibling; cloning a promise keeps a handle to the same call so either
/// copy can wait on it.
#[derive(Debug, Clone)]
pub struct RoundPromise {
    /// Zero-based round index.
    pub iteration: usize,
    /// Raw model response of this round.
    pub response: ProviderResponse,
    /// Assistant message appended this round.
    pub message: Message,
    /// The tool call this promise stands for, if any.
    pub tool_call: Option<ToolCall>,
    /// History at yield time. For a tool-call promise, this is before the
    /// call's result is appended.
    pub history: Vec<Message>,
    pub termination: TerminationReason,
}

impl RoundPromise {
    pub(crate) fn new(iteration: usize, response: ProviderResponse) -> Self {
        let message = response.message.clone();
        Self {
            iteration,
            response,
            message,
            tool_call: None,
            history: Vec::new(),
            termination: TerminationReason::None,
        }
    }

    /// Wait for the tool call to finish; a no-op without one.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<(), ToolCallError> {
        match &self.tool_call {
            Some(call) => call.wait(timeout).await,
            None => Ok(()),
        }
    }

    pub fn has_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }

    /// True for the last promise of a run.
    pub fn is_terminal(&self) -> bool {
        self.termination.is_terminal()
    }
}
