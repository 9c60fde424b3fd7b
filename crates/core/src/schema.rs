//! Tool schemas — the backend-neutral description of a tool's interface.
//!
//! A [`ToolSchema`] is turned into whatever function-calling payload a backend
//! expects by a [`SchemaBuilder`]; the shapes themselves live in
//! `toolrun-providers`.

use serde::{Deserialize, Serialize};
use crate::error::ToolError;

/// Semantic type of a tool argument (JSON Schema primitive names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ArgumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named argument of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    /// Allowed values, when the argument is an enumeration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Element type for `array` arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ArgumentType>,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ArgumentSpec {
    /// A required argument of the given type.
    pub fn new(name: impl Into<String>, kind: ArgumentType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            enum_values: None,
            items: None,
            required: true,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ArgumentType::String, description)
    }

    /// An array argument; arrays always carry their element type.
    pub fn array(name: impl Into<String>, items: ArgumentType, description: impl Into<String>) -> Self {
        let mut spec = Self::new(name, ArgumentType::Array, description);
        spec.items = Some(items);
        spec
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Name, description and ordered arguments of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
        }
    }

    pub fn argument(mut self, spec: ArgumentSpec) -> Self {
        self.arguments.push(spec);
        self
    }

    /// Reject schemas no backend could express.
    pub fn validate(&self) -> Result<(), ToolError> {
        let invalid = |reason: String| ToolError::InvalidSchema {
            tool_name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("tool name is empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for arg in &self.arguments {
            if !seen.insert(arg.name.as_str()) {
                return Err(invalid(format!("argument '{}' declared twice", arg.name)));
            }
            if arg.kind == ArgumentType::Array && arg.items.is_none() {
                return Err(invalid(format!("array argument '{}' has no item type", arg.name)));
            }
            if arg.kind != ArgumentType::Array && arg.items.is_some() {
                return Err(invalid(format!(
                    "argument '{}' is {} but declares an item type",
                    arg.name, arg.kind
                )));
            }
        }
        Ok(())
    }

    /// Names of the required arguments, in declaration order.
    pub fn required_arguments(&self) -> Vec<&str> {
        self.arguments
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// JSON Schema `object` describing the arguments.
    ///
    /// Shared by every builder; only the envelope around it differs between
    /// backends.
    pub fn parameters_json(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for arg in &self.arguments {
            let mut prop = serde_json::json!({
                "type": arg.kind.as_str(),
                "description": arg.description,
            });
            if let Some(values) = &arg.enum_values {
                prop["enum"] = serde_json::json!(values);
            }
            if let Some(items) = arg.items {
                prop["items"] = serde_json::json!({ "type": items.as_str() });
            }
            properties.insert(arg.name.clone(), prop);
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required_arguments(),
        })
    }
}

/// Maps a [`ToolSchema`] to a backend's function-calling payload.
pub trait SchemaBuilder: Send + Sync {
    /// Short name of the payload shape, for logs.
    fn name(&self) -> &str;

    fn build(&self, schema: &ToolSchema) -> serde_json::Value;

    fn build_all(&self, schemas: &[ToolSchema]) -> Vec<serde_json::Value> {
        schemas.iter().map(|s| self.build(s)).collect()
    }
}
