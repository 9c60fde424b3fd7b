//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are registered explicitly through [`ToolRegistryBuilder`], which
//! rejects duplicate names up front. The built [`ToolRegistry`] is read-only
//! and is shared between runs behind an `Arc`.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use crate::error::ToolError;
use crate::schema::{ArgumentSpec, ToolSchema};

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// A handled failure: the tool ran but could not do what was asked.
    pub fn error(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    /// Successful result whose content is the JSON rendering of `data`.
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            success: true,
            output: data.to_string(),
            data: Some(data),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Where a tool runs once the model has asked for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Runs to completion during dispatch.
    #[default]
    Inline,
    /// Left pending at dispatch; whoever holds the call runs or completes it.
    Deferred,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "ask_user", "finish").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Ordered argument specs.
    fn arguments(&self) -> Vec<ArgumentSpec> {
        Vec::new()
    }

    fn dispatch_mode(&self) -> DispatchMode {
        DispatchMode::Inline
    }

    /// Execute the tool with the given arguments.
    ///
    /// Return [`ToolError::TerminationRequested`] to ask the agent loop to stop.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Backend-neutral schema for this tool.
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            arguments: self.arguments(),
        }
    }
}

type ToolFn =
    dyn Fn(serde_json::Value) -> BoxFuture<'static, std::result::Result<ToolResult, ToolError>> + Send + Sync;

/// A tool made from a schema and a closure.
pub struct FnTool {
    schema: ToolSchema,
    mode: DispatchMode,
    func: Arc<ToolFn>,
}

impl FnTool {
    pub fn new<F, Fut>(schema: ToolSchema, func: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<ToolResult, ToolError>> + Send + 'static,
    {
        Self {
            schema,
            mode: DispatchMode::Inline,
            func: Arc::new(move |args| func(args).boxed()),
        }
    }

    /// Leave calls to this tool pending at dispatch.
    pub fn deferred(mut self) -> Self {
        self.mode = DispatchMode::Deferred;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn description(&self) -> &str {
        &self.schema.description
    }

    fn arguments(&self) -> Vec<ArgumentSpec> {
        self.schema.arguments.clone()
    }

    fn dispatch_mode(&self) -> DispatchMode {
        self.mode
    }

    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
        (self.func)(arguments).await
    }

    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }
}

/// A registry of available tools, in registration order.
///
/// The agent loop uses this to:
/// 1. Get tool schemas to send to the LLM
/// 2. Look up tools when the LLM requests them
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
    schemas: HashMap<String, ToolSchema>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// An empty registry.
    pub fn empty() -> Self {
        ToolRegistryBuilder::default().build()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// All schemas, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order.iter().map(|n| self.schemas[n].clone()).collect()
    }

    /// Schemas for the enabled subset (`None` = every tool).
    ///
    /// Registration order is kept regardless of the order of `enabled`; an
    /// unknown name is an error.
    pub fn resolve_schemas(&self, enabled: Option<&[String]>) -> std::result::Result<Vec<ToolSchema>, ToolError> {
        let Some(enabled) = enabled else {
            return Ok(self.schemas());
        };

        if let Some(unknown) = enabled.iter().find(|n| !self.contains(n)) {
            return Err(ToolError::NotFound(unknown.clone()));
        }

        Ok(self
            .order
            .iter()
            .filter(|n| enabled.contains(n))
            .map(|n| self.schemas[n].clone())
            .collect())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Collects tools and validates them before a [`ToolRegistry`] is built.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: Vec<(Arc<dyn Tool>, ToolSchema)>,
}

impl ToolRegistryBuilder {
    /// Register a tool. Fails on a duplicate name or an invalid schema.
    pub fn register(&mut self, tool: impl Tool + 'static) -> std::result::Result<&mut Self, ToolError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<&mut Self, ToolError> {
        let schema = tool.schema();
        schema.validate()?;
        if self.entries.iter().any(|(_, s)| s.name == schema.name) {
            return Err(ToolError::DuplicateName(schema.name));
        }
        self.entries.push((tool, schema));
        Ok(self)
    }

    /// Copy tools from another registry: all of them, or only `names`.
    ///
    /// Naming a tool `other` does not have is an error, as is a name clash
    /// with a tool already registered here.
    pub fn merge_from(
        &mut self,
        other: &ToolRegistry,
        names: Option<&[&str]>,
    ) -> std::result::Result<&mut Self, ToolError> {
        let selected: Vec<&str> = match names {
            Some(names) => {
                if let Some(missing) = names.iter().find(|n| !other.contains(n)) {
                    return Err(ToolError::NotFound((*missing).to_string()));
                }
                other.names().into_iter().filter(|n| names.contains(n)).collect()
            }
            None => other.names(),
        };

        for name in selected {
            if let Some(tool) = other.get(name) {
                self.register_arc(tool)?;
            }
        }
        Ok(self)
    }

    pub fn build(&mut self) -> ToolRegistry {
        let entries = std::mem::take(&mut self.entries);
        let mut order = Vec::with_capacity(entries.len());
        let mut tools = HashMap::with_capacity(entries.len());
        let mut schemas = HashMap::with_capacity(entries.len());
        for (tool, schema) in entries {
            order.push(schema.name.clone());
            tools.insert(schema.name.clone(), tool);
            schemas.insert(schema.name.clone(), schema);
        }
        ToolRegistry { order, tools, schemas }
    }
}
