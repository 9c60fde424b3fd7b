//! Error types for the toolrun domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.

use thiserror::Error;

/// The top-level error type for all toolrun operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Tool call lifecycle ---
    #[error("Tool call error: {0}")]
    ToolCall(#[from] ToolCallError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by a model backend.
///
/// Everything except [`ProviderError::ContentFiltered`] is fatal for a run.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Response blocked by content filtering: {0}")]
    ContentFiltered(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether the loop may recover from this error through its
    /// content-filter hook.
    pub fn is_content_filtered(&self) -> bool {
        matches!(self, Self::ContentFiltered(_))
    }
}

/// Failures raised by tools and by the tool registry.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    #[error("Invalid schema for tool {tool_name}: {reason}")]
    InvalidSchema { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool panicked: {0}")]
    Panicked(String),

    /// Not a failure: a tool asks the agent loop to stop. The payload becomes
    /// the tool call's result content.
    #[error("Termination requested: {0}")]
    TerminationRequested(String),
}

/// Violations of the tool-call lifecycle.
#[derive(Debug, Clone, Error)]
pub enum ToolCallError {
    /// The result of a call was read before the call reached a terminal status.
    #[error("Tool call {tool_name} ({call_id}) read before completion (status: {status})")]
    NotTerminal {
        call_id: String,
        tool_name: String,
        status: String,
    },

    #[error("Timed out after {timeout_ms}ms waiting for tool call {tool_name} ({call_id})")]
    WaitTimeout {
        call_id: String,
        tool_name: String,
        timeout_ms: u64,
    },

    #[error("Tool call {tool_name} ({call_id}) already finished")]
    AlreadyTerminal { call_id: String, tool_name: String },

    #[error("Tool call {tool_name} ({call_id}) is already executing")]
    AlreadyStarted { call_id: String, tool_name: String },

    #[error("Tool call {tool_name} ({call_id}) has not been dispatched")]
    NotDispatched { call_id: String, tool_name: String },
}
