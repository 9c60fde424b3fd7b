//! Walk a scripted conversation through the loop and print the run summary.
//!
//! ```sh
//! cargo run -p toolrun-agent --example scripted_run
//! ```

use serde_json::json;
use std::sync::Arc;
use toolrun_agent::{AgentLoop, RunOptions};
use toolrun_config::AppConfig;
use toolrun_core::{FnTool, ProviderResponse, TokenUsage, ToolRegistry, ToolResult, ToolSchema};
use toolrun_core::schema::ArgumentSpec;
use toolrun_providers::{make_tool_call, make_tool_call_response, ScriptedProvider};
use toolrun_tools::FinishTool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    toolrun_telemetry::logging::init(false);

    let lookup = FnTool::new(
        ToolSchema::new("lookup", "Look up a city's population")
            .argument(ArgumentSpec::string("city", "City name")),
        |args| async move {
            let city = args["city"].as_str().unwrap_or_default().to_string();
            Ok(ToolResult::json(json!({ "city": city, "population": 2_100_000 })))
        },
    );
    let mut builder = ToolRegistry::builder();
    builder.register(lookup)?.register(FinishTool)?;
    let registry = Arc::new(builder.build());

    // Replies as a priced model would send them, so the summary carries a cost.
    let priced = |mut response: ProviderResponse| {
        response.model = "gpt-4o-mini".into();
        response.with_usage(TokenUsage::new(1_200, 80).with_cached(1_000))
    };
    let provider = Arc::new(
        ScriptedProvider::new(vec![
            priced(make_tool_call_response(
                vec![make_tool_call("lookup", json!({"city": "Paris"}))],
                "Checking.",
            )),
            priced(make_tool_call_response(
                vec![make_tool_call("finish", json!({"answer": "Paris has about 2.1 million people."}))],
                "",
            )),
        ])
        .with_name("openai")
        .with_cost_tracking(true),
    );

    let mut config = AppConfig::default();
    config.system_prompt = Some("Answer with numbers.".into());
    let agent = AgentLoop::from_config(provider, &config)?;

    let mut run = agent.run("How many people live in Paris?", registry, RunOptions::new())?;
    while let Some(promise) = run.next().await {
        let promise = promise?;
        match &promise.tool_call {
            Some(call) => println!("[{}] tool call: {} {}", promise.iteration, call.name(), call.arguments()),
            None => println!("[{}] model: {}", promise.iteration, promise.message.content),
        }
        if promise.is_terminal() {
            println!("finished: {}", promise.termination);
            if let Some(answer) = promise.tool_call.as_ref().and_then(|c| c.content()) {
                println!("answer: {answer}");
            }
        }
    }

    println!("\n{}", agent.tracker().summary());
    Ok(())
}
