//! Function-calling payload shapes.
//!
//! Chat-completions style backends (OpenAI chat, Azure, Ollama) nest the
//! function description under a `"function"` key; the Responses API takes
//! it flat.

use toolrun_core::{SchemaBuilder, ToolSchema};

/// Argument object for a schema; tools without arguments send `{}`.
fn parameters(schema: &ToolSchema) -> serde_json::Value {
    if schema.arguments.is_empty() {
        serde_json::json!({})
    } else {
        schema.parameters_json()
    }
}

/// `{"type": "function", "function": {name, description, parameters}}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCompletionsSchema;

impl SchemaBuilder for ChatCompletionsSchema {
    fn name(&self) -> &str {
        "chat_completions"
    }

    fn build(&self, schema: &ToolSchema) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": schema.name,
                "description": schema.description,
                "parameters": parameters(schema),
            }
        })
    }
}

/// `{"type": "function", name, description, parameters}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsesSchema;

impl SchemaBuilder for ResponsesSchema {
    fn name(&self) -> &str {
        "responses"
    }

    fn build(&self, schema: &ToolSchema) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "name": schema.name,
            "description": schema.description,
            "parameters": parameters(schema),
        })
    }
}

/// Pick the payload shape for a backend family.
///
/// `openai` means the Responses API; everything else speaks chat
/// completions.
pub fn for_backend(backend: &str) -> Box<dyn SchemaBuilder> {
    match backend.to_ascii_lowercase().as_str() {
        "openai" | "responses" => Box::new(ResponsesSchema),
        _ => Box::new(ChatCompletionsSchema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrun_core::{ArgumentSpec, ArgumentType};

    fn lookup_schema() -> ToolSchema {
        ToolSchema::new("lookup", "Look up a record")
            .argument(ArgumentSpec::string("id", "Record id"))
            .argument(
                ArgumentSpec::string("table", "Table name")
                    .with_enum(["users", "orders"])
                    .optional(),
            )
            .argument(ArgumentSpec::array("fields", ArgumentType::String, "Columns").optional())
    }

    #[test]
    fn chat_completions_nests_under_function() {
        let built = ChatCompletionsSchema.build(&lookup_schema());
        assert_eq!(built["type"], "function");
        assert_eq!(built["function"]["name"], "lookup");
        let params = &built["function"]["parameters"];
        assert_eq!(params["properties"]["table"]["enum"][0], "users");
        assert_eq!(params["properties"]["fields"]["items"]["type"], "string");
        assert_eq!(params["required"], serde_json::json!(["id"]));
        assert!(built.get("name").is_none());
    }

    #[test]
    fn responses_is_flat() {
        let built = ResponsesSchema.build(&lookup_schema());
        assert_eq!(built["type"], "function");
        assert_eq!(built["name"], "lookup");
        assert_eq!(built["parameters"]["properties"]["id"]["type"], "string");
        assert!(built.get("function").is_none());
    }

    #[test]
    fn no_arguments_sends_empty_parameters() {
        let schema = ToolSchema::new("finish", "Stop");
        assert_eq!(ResponsesSchema.build(&schema)["parameters"], serde_json::json!({}));
        assert_eq!(
            ChatCompletionsSchema.build(&schema)["function"]["parameters"],
            serde_json::json!({})
        );
    }

    #[test]
    fn backend_family_selects_shape() {
        assert_eq!(for_backend("OpenAI").name(), "responses");
        assert_eq!(for_backend("ollama").name(), "chat_completions");
        assert_eq!(for_backend("azure").name(), "chat_completions");

        let all = for_backend("azure").build_all(&[lookup_schema(), ToolSchema::new("finish", "Stop")]);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1]["function"]["name"], "finish");
    }
}
