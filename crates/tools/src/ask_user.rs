//! Lets the model put a question to the human operator.
//!
//! The question goes through a [`Prompter`], so embedders can route it to
//! whatever UI they have. The default prompter uses the terminal.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use toolrun_core::error::ToolError;
use toolrun_core::schema::ArgumentSpec;
use toolrun_core::tool::{Tool, ToolResult};

/// Answers questions on behalf of the human.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn ask(&self, question: &str) -> std::io::Result<String>;
}

/// Prints the question to stdout and reads one line from stdin.
#[derive(Debug, Default)]
pub struct StdinPrompter;

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&self, question: &str) -> std::io::Result<String> {
        let mut stdout = tokio::io::stdout();
        let banner = format!(
            "\n{rule}\n  The agent needs your input to proceed.\n\n  Question: {question}\n{rule}\n> ",
            rule = "═".repeat(66)
        );
        stdout.write_all(banner.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

pub struct AskUserTool {
    prompter: Arc<dyn Prompter>,
}

impl AskUserTool {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self { prompter }
    }

    /// Ask on the terminal.
    pub fn stdin() -> Self {
        Self::new(Arc::new(StdinPrompter))
    }
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user a question and return the answer."
    }

    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::string("question", "The question to ask the user.")]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let question = arguments["question"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'question' argument".into()))?;

        let answer = self
            .prompter
            .ask(question)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "ask_user".into(),
                reason: format!("could not read the answer: {e}"),
            })?;

        Ok(ToolResult::json(serde_json::json!({
            "user_answer": answer,
            "status": "success",
        })))
    }
}
