//! A provider that replays a script of responses.
//!
//! Used by tests and demos to drive the agent loop deterministically.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use toolrun_core::{
    Message, MessageToolCall, Provider, ProviderError, ProviderRequest, ProviderResponse, TokenUsage,
};
use uuid::Uuid;

/// Returns the next scripted outcome on every `complete` call.
///
/// Once the script runs out every call fails with
/// [`ProviderError::NotConfigured`].
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    tracks_cost: bool,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::from_script(responses.into_iter().map(Ok).collect())
    }

    /// Script that may include failures.
    pub fn from_script(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            name: "scripted".into(),
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            tracks_cost: false,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Report responses as billable so the run tracker prices them.
    pub fn with_cost_tracking(mut self, enabled: bool) -> Self {
        self.tracks_cost = enabled;
        self
    }

    /// Append another outcome to the script.
    pub fn push(&self, outcome: Result<ProviderResponse, ProviderError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ProviderError::NotConfigured(format!(
                "{}: script exhausted at call #{call}",
                self.name
            )))
        })
    }

    fn tracks_cost(&self) -> bool {
        self.tracks_cost
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse::new(Message::assistant(text), "mock-model").with_usage(TokenUsage::new(10, 5))
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse::new(Message::assistant(thought).with_tool_calls(tool_calls), "mock-model")
        .with_usage(TokenUsage::new(10, 5))
}

/// Helper to create a tool call with a fresh id.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    let id = Uuid::new_v4().simple().to_string();
    MessageToolCall::new(format!("call_{}", &id[..12]), name, args.to_string())
}
