//! The agent loop for toolrun.
//!
//! A run alternates between two kinds of step:
//!
//! 1. **Generate**: send the history and the enabled tool schemas to the
//!    model, record usage, append the assistant message
//! 2. **Dispatch**: turn each tool-call request into a [`ToolCall`] and hand
//!    it to its tool, one per pull
//!
//! Every step yields a [`RoundPromise`]. Before the next step, the loop waits
//! for the previous promise's tool call and appends its result, so results
//! land in request order no matter when the calls finish.
//!
//! The run ends when a tool asks for termination, the iteration bound is
//! reached, or (with [`RunOptions::stop_on_answer`]) the model answers
//! without calling a tool.
//!
//! [`ToolCall`]: toolrun_core::ToolCall

pub mod history;
pub mod hooks;
pub mod loop_runner;
pub mod round;

pub use hooks::LoopHooks;
pub use loop_runner::{AgentLoop, AgentRun, RunInput, RunOptions};
pub use round::RoundPromise;
