//! One invocation of a registered tool and its lifecycle.
//!
//! ```text
//!            dispatch (inline)
//!  Pending ─────────────────────▶ Executing ──▶ Completed | Failed
//!     │        execute() (deferred)     ▲
//!     └─────────────────────────────────┘
//! ```
//!
//! A [`ToolCall`] is a cheap handle: clones share the same state, so a call
//! can be moved to a spawned task while the agent loop keeps a copy to wait
//! on. Completion is published through a `tokio::sync::watch` channel and is
//! final: the first terminal transition wins, later ones are rejected.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};
use crate::error::{ToolCallError, ToolError};
use crate::message::{Message, MessageToolCall};
use crate::tool::{DispatchMode, Tool, ToolRegistry, ToolResult};

/// Where a tool call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl ToolCallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct CallState {
    status: ToolCallStatus,
    content: Option<String>,
    data: Option<serde_json::Value>,
    is_termination: bool,
}

impl CallState {
    fn pending() -> Self {
        Self {
            status: ToolCallStatus::Pending,
            content: None,
            data: None,
            is_termination: false,
        }
    }
}

struct Shared {
    tool: OnceLock<Arc<dyn Tool>>,
    state: watch::Sender<CallState>,
}

/// One invocation of a tool requested by the model.
#[derive(Clone)]
pub struct ToolCall {
    id: String,
    name: String,
    arguments: serde_json::Value,
    /// Set when the model's argument string was not a JSON object.
    argument_error: Option<String>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ToolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("ToolCall")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("status", &state.status)
            .field("is_termination", &state.is_termination)
            .finish()
    }
}

impl ToolCall {
    /// A pending call with already-parsed arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let (argument_error, arguments) = match arguments {
            serde_json::Value::Object(_) => (None, arguments),
            serde_json::Value::Null => (None, serde_json::json!({})),
            other => (Some(format!("arguments must be a JSON object, got {other}")), other),
        };
        let (state, _) = watch::channel(CallState::pending());
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            argument_error,
            shared: Arc::new(Shared {
                tool: OnceLock::new(),
                state,
            }),
        }
    }

    /// Build a call from the request embedded in an assistant message.
    ///
    /// An empty argument string means "no arguments"; anything that is not a
    /// JSON object makes the call fail at dispatch.
    pub fn from_request(request: &MessageToolCall) -> Self {
        if request.arguments.trim().is_empty() {
            return Self::new(&request.id, &request.name, serde_json::json!({}));
        }
        match serde_json::from_str::<serde_json::Value>(&request.arguments) {
            Ok(value) => Self::new(&request.id, &request.name, value),
            Err(e) => {
                let mut call = Self::new(&request.id, &request.name, serde_json::json!({}));
                call.argument_error = Some(format!("arguments are not valid JSON: {e}"));
                call
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &serde_json::Value {
        &self.arguments
    }

    pub fn status(&self) -> ToolCallStatus {
        self.shared.state.borrow().status
    }

    /// True once the call is Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// True when the tool asked the agent loop to stop.
    pub fn is_termination(&self) -> bool {
        self.shared.state.borrow().is_termination
    }

    pub fn is_successful(&self) -> bool {
        self.status() == ToolCallStatus::Completed
    }

    /// Result content; `None` until terminal.
    pub fn content(&self) -> Option<String> {
        self.shared.state.borrow().content.clone()
    }

    /// Structured data returned alongside the content, if any.
    pub fn data(&self) -> Option<serde_json::Value> {
        self.shared.state.borrow().data.clone()
    }

    /// How the resolved tool wants to run; `None` before dispatch or when
    /// the tool was not found.
    pub fn dispatch_mode(&self) -> Option<DispatchMode> {
        self.shared.tool.get().map(|t| t.dispatch_mode())
    }

    /// Resolve the tool and, for inline tools, run it to completion.
    ///
    /// Tool failures never escape: a missing tool, malformed arguments, an
    /// error or a panic all end in [`ToolCallStatus::Failed`]. Deferred tools
    /// are left pending for the holder of the call to [`execute`](Self::execute).
    pub async fn dispatch(&self, registry: &ToolRegistry) -> Result<(), ToolCallError> {
        if self.is_terminal() {
            return Err(self.already_terminal());
        }

        if let Some(reason) = &self.argument_error {
            warn!(tool = %self.name, call_id = %self.id, "Rejecting tool call: {reason}");
            return self.fail(ToolError::InvalidArguments(reason.clone()).to_string());
        }

        let Some(tool) = registry.get(&self.name) else {
            warn!(tool = %self.name, call_id = %self.id, "Model requested an unknown tool");
            return self.fail(ToolError::NotFound(self.name.clone()).to_string());
        };

        let mode = tool.dispatch_mode();
        // A second dispatch of the same call keeps the first resolution.
        let _ = self.shared.tool.set(tool);

        match mode {
            DispatchMode::Inline => self.execute().await,
            DispatchMode::Deferred => {
                debug!(tool = %self.name, call_id = %self.id, "Tool call deferred to caller");
                Ok(())
            }
        }
    }

    /// Run a dispatched, still-pending call: Pending → Executing → terminal.
    pub async fn execute(&self) -> Result<(), ToolCallError> {
        let Some(tool) = self.shared.tool.get().cloned() else {
            return Err(ToolCallError::NotDispatched {
                call_id: self.id.clone(),
                tool_name: self.name.clone(),
            });
        };

        let mut previous = ToolCallStatus::Pending;
        let started = self.shared.state.send_if_modified(|state| {
            previous = state.status;
            if state.status == ToolCallStatus::Pending {
                state.status = ToolCallStatus::Executing;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(match previous {
                ToolCallStatus::Executing => ToolCallError::AlreadyStarted {
                    call_id: self.id.clone(),
                    tool_name: self.name.clone(),
                },
                _ => self.already_terminal(),
            });
        }

        let start = std::time::Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(self.arguments.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ToolError::Panicked(panic_message(panic))));

        debug!(
            tool = %self.name,
            call_id = %self.id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool execution finished"
        );
        self.resolve(outcome)
    }

    /// Finish the call from a tool outcome, mapping it the same way dispatch
    /// does. For callers that run the work themselves.
    pub fn resolve(&self, outcome: Result<ToolResult, ToolError>) -> Result<(), ToolCallError> {
        match outcome {
            Ok(result) if result.success => {
                self.finish(ToolCallStatus::Completed, result.output, result.data, false)
            }
            Ok(result) => self.finish(ToolCallStatus::Failed, result.output, result.data, false),
            Err(ToolError::TerminationRequested(content)) => {
                self.finish(ToolCallStatus::Completed, content, None, true)
            }
            Err(e) => {
                warn!(tool = %self.name, call_id = %self.id, error = %e, "Tool execution failed");
                self.finish(ToolCallStatus::Failed, e.to_string(), None, false)
            }
        }
    }

    /// Mark the call Completed with the given content.
    pub fn complete(&self, content: impl Into<String>) -> Result<(), ToolCallError> {
        self.finish(ToolCallStatus::Completed, content.into(), None, false)
    }

    /// Mark the call Failed with the given reason.
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), ToolCallError> {
        self.finish(ToolCallStatus::Failed, reason.into(), None, false)
    }

    /// Mark the call Completed and ask the agent loop to stop.
    pub fn request_termination(&self, content: impl Into<String>) -> Result<(), ToolCallError> {
        self.finish(ToolCallStatus::Completed, content.into(), None, true)
    }

    fn finish(
        &self,
        status: ToolCallStatus,
        content: String,
        data: Option<serde_json::Value>,
        is_termination: bool,
    ) -> Result<(), ToolCallError> {
        let mut content = Some(content);
        let mut data = data;
        let changed = self.shared.state.send_if_modified(|state| {
            if state.status.is_terminal() {
                return false;
            }
            state.status = status;
            state.content = content.take();
            state.data = data.take();
            state.is_termination = is_termination;
            true
        });

        if changed {
            Ok(())
        } else {
            Err(self.already_terminal())
        }
    }

    /// Block until the call is terminal.
    ///
    /// Returns immediately for a terminal call. With a timeout, fails with
    /// [`ToolCallError::WaitTimeout`] once it elapses; `Some(Duration::ZERO)`
    /// on a non-terminal call fails straight away.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<(), ToolCallError> {
        if self.is_terminal() {
            return Ok(());
        }

        let mut rx = self.shared.state.subscribe();
        let done = async move {
            // The sender lives in `self.shared`, so the channel cannot close
            // while we wait on it.
            let _ = rx.wait_for(|s| s.status.is_terminal()).await;
        };

        match timeout {
            None => {
                done.await;
                Ok(())
            }
            Some(limit) => tokio::time::timeout(limit, done).await.map_err(|_| {
                ToolCallError::WaitTimeout {
                    call_id: self.id.clone(),
                    tool_name: self.name.clone(),
                    timeout_ms: limit.as_millis() as u64,
                }
            }),
        }
    }

    /// The tool-result message to append to history.
    ///
    /// Reading a result before the call is terminal is an execution-order
    /// violation, never a partial result.
    pub fn to_result_message(&self) -> Result<Message, ToolCallError> {
        let state = self.shared.state.borrow().clone();
        if !state.status.is_terminal() {
            return Err(ToolCallError::NotTerminal {
                call_id: self.id.clone(),
                tool_name: self.name.clone(),
                status: state.status.to_string(),
            });
        }

        let mut msg = Message::tool_result(&self.id, &self.name, state.content.unwrap_or_default());
        msg.structured = state.data;
        msg.metadata
            .insert("status".into(), serde_json::json!(state.status.as_str()));
        if state.is_termination {
            msg.metadata.insert("termination".into(), serde_json::json!(true));
        }
        Ok(msg)
    }

    fn already_terminal(&self) -> ToolCallError {
        ToolCallError::AlreadyTerminal {
            call_id: self.id.clone(),
            tool_name: self.name.clone(),
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArgumentSpec, ToolSchema};
    use crate::tool::FnTool;

    fn registry() -> ToolRegistry {
        ToolRegistry::builder()
            .register(FnTool::new(
                ToolSchema::new("add", "Adds two numbers")
                    .argument(ArgumentSpec::new("a", crate::schema::ArgumentType::Number, "lhs"))
                    .argument(ArgumentSpec::new("b", crate::schema::ArgumentType::Number, "rhs")),
                |args| async move {
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    Ok(ToolResult::ok(format!("{}", a + b)))
                },
            ))
            .unwrap()
            .register(FnTool::new(ToolSchema::new("broken", "Always errors"), |_| async {
                Err(ToolError::ExecutionFailed {
                    tool_name: "broken".into(),
                    reason: "disk on fire".into(),
                })
            }))
            .unwrap()
            .register(FnTool::new(ToolSchema::new("stop", "Ends the run"), |_| async {
                Err(ToolError::TerminationRequested("all done".into()))
            }))
            .unwrap()
            .register(FnTool::new(ToolSchema::new("panics", "Panics"), |_| async {
                panic!("tool blew up")
            }))
            .unwrap()
            .register(
                FnTool::new(ToolSchema::new("slow", "Runs elsewhere"), |_| async {
                    Ok(ToolResult::ok("slow result"))
                })
                .deferred(),
            )
            .unwrap()
            .build()
    }

    fn call(name: &str, args: &str) -> ToolCall {
        ToolCall::from_request(&MessageToolCall::new(format!("call_{name}"), name, args))
    }

    #[tokio::test]
    async fn inline_tool_completes_during_dispatch() {
        let call = call("add", r#"{"a": 2, "b": 3}"#);
        assert_eq!(call.status(), ToolCallStatus::Pending);

        call.dispatch(&registry()).await.unwrap();
        assert_eq!(call.status(), ToolCallStatus::Completed);
        assert_eq!(call.content().as_deref(), Some("5"));
        assert!(!call.is_termination());
    }

    #[tokio::test]
    async fn tool_error_becomes_failed_call() {
        let call = call("broken", "{}");
        call.dispatch(&registry()).await.unwrap();
        assert_eq!(call.status(), ToolCallStatus::Failed);
        assert!(call.content().unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn termination_signal_completes_with_flag() {
        let call = call("stop", "");
        call.dispatch(&registry()).await.unwrap();
        assert_eq!(call.status(), ToolCallStatus::Completed);
        assert!(call.is_termination());
        assert_eq!(call.content().as_deref(), Some("all done"));

        let msg = call.to_result_message().unwrap();
        assert_eq!(msg.metadata["termination"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn panic_is_caught_and_failed() {
        let call = call("panics", "{}");
        call.dispatch(&registry()).await.unwrap();
        assert_eq!(call.status(), ToolCallStatus::Failed);
        assert!(call.content().unwrap().contains("tool blew up"));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_fail() {
        let missing = call("nope", "{}");
        missing.dispatch(&registry()).await.unwrap();
        assert_eq!(missing.status(), ToolCallStatus::Failed);
        assert!(missing.content().unwrap().contains("nope"));

        let garbled = call("add", "{not json");
        garbled.dispatch(&registry()).await.unwrap();
        assert_eq!(garbled.status(), ToolCallStatus::Failed);
        assert!(garbled.content().unwrap().contains("not valid JSON"));

        let scalar = call("add", "42");
        scalar.dispatch(&registry()).await.unwrap();
        assert_eq!(scalar.status(), ToolCallStatus::Failed);
    }

    #[tokio::test]
    async fn deferred_tool_stays_pending_until_executed() {
        let call = call("slow", "{}");
        call.dispatch(&registry()).await.unwrap();
        assert_eq!(call.status(), ToolCallStatus::Pending);
        assert_eq!(call.dispatch_mode(), Some(DispatchMode::Deferred));

        let worker = call.clone();
        let handle = tokio::spawn(async move { worker.execute().await });
        call.wait(None).await.unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(call.content().as_deref(), Some("slow result"));
        assert!(matches!(call.execute().await, Err(ToolCallError::AlreadyTerminal { .. })));
    }

    #[tokio::test]
    async fn wait_on_terminal_call_returns_immediately() {
        let call = call("add", r#"{"a": 1, "b": 1}"#);
        call.dispatch(&registry()).await.unwrap();
        call.wait(Some(Duration::ZERO)).await.unwrap();
        call.wait(None).await.unwrap();
    }

    #[tokio::test]
    async fn wait_with_zero_timeout_on_pending_call_times_out() {
        let call = call("slow", "{}");
        call.dispatch(&registry()).await.unwrap();
        let err = call.wait(Some(Duration::ZERO)).await.unwrap_err();
        assert!(matches!(err, ToolCallError::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn result_message_before_terminal_is_an_order_violation() {
        let call = call("slow", "{}");
        call.dispatch(&registry()).await.unwrap();
        let err = call.to_result_message().unwrap_err();
        assert!(matches!(err, ToolCallError::NotTerminal { ref status, .. } if status == "pending"));

        call.complete("done by hand").unwrap();
        let msg = call.to_result_message().unwrap();
        assert_eq!(msg.content, "done by hand");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_slow"));
    }

    #[tokio::test]
    async fn terminal_transition_happens_once() {
        let call = call("slow", "{}");
        call.dispatch(&registry()).await.unwrap();
        call.fail("gave up").unwrap();
        assert!(matches!(call.complete("late"), Err(ToolCallError::AlreadyTerminal { .. })));
        assert_eq!(call.content().as_deref(), Some("gave up"));
        assert_eq!(call.status(), ToolCallStatus::Failed);
    }

    #[tokio::test]
    async fn execute_before_dispatch_is_rejected() {
        let call = call("add", "{}");
        assert!(matches!(call.execute().await, Err(ToolCallError::NotDispatched { .. })));
    }

    #[tokio::test]
    async fn clones_share_completion_state() {
        let call = call("slow", "{}");
        let copy = call.clone();
        call.dispatch(&registry()).await.unwrap();
        copy.request_termination("bye").unwrap();
        assert!(call.is_terminal());
        assert!(call.is_termination());
    }
}
