//! # toolrun Core
//!
//! Domain types, traits, and error definitions for the toolrun agent loop.
//! Backends, tools, telemetry and the loop itself all depend inward on this
//! crate.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here ([`Provider`], [`Tool`], [`SchemaBuilder`]).
//! Implementations live in their respective crates, so tests can swap in
//! scripted stand-ins without touching the loop.

pub mod agent;
pub mod error;
pub mod message;
pub mod provider;
pub mod schema;
pub mod tool;
pub mod tool_call;

// Re-export key types at crate root for ergonomics
pub use agent::TerminationReason;
pub use error::{Error, ProviderError, Result, ToolCallError, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ReasoningEffort, TokenUsage};
pub use schema::{ArgumentSpec, ArgumentType, SchemaBuilder, ToolSchema};
pub use tool::{DispatchMode, FnTool, Tool, ToolRegistry, ToolRegistryBuilder, ToolResult};
pub use tool_call::{ToolCall, ToolCallStatus};
