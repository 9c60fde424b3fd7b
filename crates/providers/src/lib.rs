//! Backend-facing pieces for toolrun.
//!
//! Network backends live outside this workspace and implement the
//! `toolrun_core::Provider` trait themselves. This crate carries what every
//! backend shares: the function-calling payload shapes, plus a scripted
//! provider for tests and demos.

pub mod schema;
pub mod scripted;

pub use schema::{for_backend, ChatCompletionsSchema, ResponsesSchema};
pub use scripted::{make_text_response, make_tool_call, make_tool_call_response, ScriptedProvider};
