//! Built-in tool implementations for toolrun.
//!
//! - `ask_user` puts a question to the human through a [`Prompter`].
//! - `finish` ends the run with a final answer.

pub mod ask_user;
pub mod finish;

use std::sync::Arc;
use toolrun_core::error::ToolError;
use toolrun_core::tool::ToolRegistry;

pub use ask_user::{AskUserTool, Prompter, StdinPrompter};
pub use finish::FinishTool;

/// Registry with every built-in tool, asking questions on the terminal.
pub fn builtin_registry() -> Result<ToolRegistry, ToolError> {
    builtin_registry_with(Arc::new(StdinPrompter))
}

/// Registry with every built-in tool, asking questions through `prompter`.
pub fn builtin_registry_with(prompter: Arc<dyn Prompter>) -> Result<ToolRegistry, ToolError> {
    Ok(ToolRegistry::builder()
        .register(AskUserTool::new(prompter))?
        .register(FinishTool)?
        .build())
}
