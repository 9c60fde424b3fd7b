//! Gives the model an explicit way to end the run.

use async_trait::async_trait;
use toolrun_core::error::ToolError;
use toolrun_core::schema::ArgumentSpec;
use toolrun_core::tool::{Tool, ToolResult};

pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn description(&self) -> &str {
        "Call when the task is complete. Pass the final answer for the user."
    }

    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::string("answer", "The final answer.").optional()]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let answer = arguments["answer"].as_str().unwrap_or("Task finished.");
        Err(ToolError::TerminationRequested(answer.to_string()))
    }
}
