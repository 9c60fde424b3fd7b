//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation plus tool schemas to a model
//! and get a complete response back. Wire marshalling, retries and
//! authentication are the implementation's business; the agent loop only
//! sees [`ProviderRequest`] in and [`ProviderResponse`] out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// How much hidden reasoning the model should spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl std::str::FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown reasoning effort '{other}'")),
        }
    }
}

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "openai/gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Reasoning effort for models that support it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Tool schemas, already shaped for this backend by a `SchemaBuilder`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,

    /// JSON schema the response must follow (structured output)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

fn default_temperature() -> f32 {
    0.0
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message (carries any tool-call requests)
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<TokenUsage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Parsed structured output, when a response format was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,

    /// Reasoning text, for backends that expose it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    /// Soft failure reported alongside an otherwise well-formed response
    /// (e.g. structured output that failed to parse)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Provider-specific metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ProviderResponse {
    /// Wrap an assistant message as a successful response.
    pub fn new(message: Message, model: impl Into<String>) -> Self {
        Self {
            message,
            usage: None,
            model: model.into(),
            structured: None,
            thinking: None,
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// True when the backend reported no error.
    pub fn is_successful(&self) -> bool {
        self.error.is_none()
    }

    /// The text content of the assistant message.
    pub fn content(&self) -> &str {
        &self.message.content
    }

    /// Tool-call requests, in the order the model returned them.
    pub fn tool_calls(&self) -> &[MessageToolCall] {
        &self.message.tool_calls
    }
}

/// Token usage information for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Output tokens spent on hidden reasoning (subset of output)
    #[serde(default)]
    pub reasoning_tokens: u64,
    /// Input tokens served from the prompt cache (subset of input)
    #[serde(default)]
    pub cached_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning_tokens: u64) -> Self {
        self.reasoning_tokens = reasoning_tokens;
        self
    }

    pub fn with_cached(mut self, cached_tokens: u64) -> Self {
        self.cached_tokens = cached_tokens;
        self
    }

    /// Input + output.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls
/// `complete()` without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    ///
    /// Must return [`ProviderError::ContentFiltered`] when the backend refused
    /// the content, and any other variant for everything else.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Token accounting for a successful response.
    ///
    /// Default reads `response.usage`. Backends that report usage elsewhere
    /// (metadata, raw payload) override this.
    fn token_usage(&self, response: &ProviderResponse) -> TokenUsage {
        response.usage.unwrap_or_default()
    }

    /// Whether the backend bills per token, i.e. whether cost should be
    /// tracked for its responses.
    fn tracks_cost(&self) -> bool {
        false
    }
}
