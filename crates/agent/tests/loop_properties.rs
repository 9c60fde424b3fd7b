//! End-to-end behaviour of the agent loop against a scripted backend.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use toolrun_agent::{AgentLoop, LoopHooks, RoundPromise, RunOptions};
use toolrun_core::{
    Error, FnTool, Message, MessageToolCall, ProviderResponse, Role, TerminationReason, TokenUsage, ToolCallError,
    ToolCallStatus, ToolError, ToolRegistry, ToolResult, ToolSchema,
};
use toolrun_providers::{make_text_response, make_tool_call, make_tool_call_response, ScriptedProvider};
use toolrun_telemetry::{ModelPricing, PricingTable, RunTracker};
use toolrun_tools::{builtin_registry_with, FinishTool, Prompter};

fn echo_tool() -> FnTool {
    FnTool::new(ToolSchema::new("echo", "Echo the arguments"), |args| async move {
        Ok(ToolResult::ok(args["text"].as_str().unwrap_or_default()))
    })
}

/// A tool whose calls stay pending until someone outside the loop finishes them.
fn manual_tool() -> FnTool {
    FnTool::new(ToolSchema::new("manual", "Finished by the caller"), |_| async move {
        Ok(ToolResult::ok("ran inline"))
    })
    .deferred()
}

fn registry() -> Arc<ToolRegistry> {
    let mut builder = ToolRegistry::builder();
    builder.register(echo_tool()).unwrap();
    builder.register(manual_tool()).unwrap();
    builder.register(FinishTool).unwrap();
    Arc::new(builder.build())
}

async fn drain(run: &mut toolrun_agent::AgentRun) -> Vec<RoundPromise> {
    let mut promises = Vec::new();
    while let Some(promise) = run.next().await {
        promises.push(promise.unwrap());
    }
    promises
}

#[tokio::test]
async fn rounds_without_tools_yield_one_promise_each() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        make_text_response("one"),
        make_text_response("two"),
        make_text_response("three"),
    ]));
    let agent = AgentLoop::new(provider.clone(), "mock-model");
    let mut run = agent
        .run("count", registry(), RunOptions::new().with_max_iterations(3))
        .unwrap();

    let promises = drain(&mut run).await;

    assert_eq!(promises.len(), 3);
    let iterations: Vec<usize> = promises.iter().map(|p| p.iteration).collect();
    assert_eq!(iterations, vec![0, 1, 2]);
    assert!(promises[..2].iter().all(|p| p.termination == TerminationReason::None));
    assert_eq!(promises[2].termination, TerminationReason::MaxIterations);
    assert_eq!(provider.call_count(), 3);
    assert!(run.is_finished());
}

#[tokio::test]
async fn termination_request_ends_the_run_mid_round() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        make_tool_call_response(
            vec![
                make_tool_call("echo", json!({"text": "before"})),
                make_tool_call("finish", json!({"answer": "42"})),
                make_tool_call("echo", json!({"text": "after"})),
            ],
            "wrapping up",
        ),
        make_text_response("never requested"),
    ]));
    let agent = AgentLoop::new(provider.clone(), "mock-model");
    let mut run = agent.run("go", registry(), RunOptions::new()).unwrap();

    let promises = drain(&mut run).await;

    let terminal: Vec<&RoundPromise> = promises.iter().filter(|p| p.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    let last = promises.last().unwrap();
    assert_eq!(last.termination, TerminationReason::TerminationRequested);

    let finish = last.tool_call.as_ref().unwrap();
    assert_eq!(finish.name(), "finish");
    assert!(finish.is_termination());
    assert_eq!(finish.content().as_deref(), Some("42"));

    let result = last.history.last().unwrap();
    assert_eq!(result.role, Role::Tool);
    assert_eq!(result.content, "42");
    assert_eq!(result.metadata["termination"], json!(true));

    // The third request is never dispatched and the model is not called again.
    assert_eq!(agent.tracker().tool_invocation_count("echo"), 1);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(provider.remaining(), 1);
}

#[tokio::test]
async fn each_request_gets_its_own_tool_call() {
    let requests = vec![
        make_tool_call("echo", json!({"text": "a"})),
        make_tool_call("echo", json!({"text": "b"})),
        make_tool_call("echo", json!({"text": "c"})),
    ];
    let ids: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
    let provider = Arc::new(ScriptedProvider::new(vec![make_tool_call_response(requests, "")]));
    let agent = AgentLoop::new(provider, "mock-model");
    let mut run = agent
        .run("go", registry(), RunOptions::new().with_max_iterations(1))
        .unwrap();

    let promises = drain(&mut run).await;

    // Three call promises, then the trailing max-iterations promise.
    assert_eq!(promises.len(), 4);
    let call_ids: Vec<String> = promises[..3]
        .iter()
        .map(|p| p.tool_call.as_ref().unwrap().id().to_string())
        .collect();
    assert_eq!(call_ids, ids);
    assert!(promises[..3].iter().all(|p| p.iteration == 0));

    let trailing = &promises[3];
    assert!(!trailing.has_tool_call());
    assert_eq!(trailing.termination, TerminationReason::MaxIterations);
    let results: Vec<&str> = trailing
        .history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(results, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn tool_call_snapshot_precedes_its_result() {
    let provider = Arc::new(ScriptedProvider::tool_then_answer(
        vec![make_tool_call("echo", json!({"text": "hi"}))],
        "let me echo",
        "done",
    ));
    let agent = AgentLoop::new(provider, "mock-model");
    let mut run = agent.run("go", registry(), RunOptions::new()).unwrap();

    let first = run.next().await.unwrap().unwrap();
    assert_eq!(first.history.len(), 2);
    assert_eq!(first.history[1].content, "let me echo");

    // The live history already carries the result once the next pull starts.
    let second = run.next().await.unwrap().unwrap();
    assert_eq!(second.history[2].content, "hi");
    assert_eq!(run.history().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn deferred_results_follow_request_order() {
    let requests = vec![
        make_tool_call("manual", json!({})),
        make_tool_call("manual", json!({})),
    ];
    let provider = Arc::new(ScriptedProvider::new(vec![make_tool_call_response(requests, "")]));
    let agent = AgentLoop::new(provider, "mock-model");
    let mut run = agent
        .run("go", registry(), RunOptions::new().with_max_iterations(1))
        .unwrap();

    // The first call finishes last: its worker sleeps before completing.
    let first = run.next().await.unwrap().unwrap();
    let slow = first.tool_call.clone().unwrap();
    assert_eq!(slow.status(), ToolCallStatus::Pending);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        slow.complete("slow").unwrap();
    });

    let second = run.next().await.unwrap().unwrap();
    let fast = second.tool_call.clone().unwrap();
    tokio::spawn(async move {
        fast.complete("fast").unwrap();
    });

    let last = run.next().await.unwrap().unwrap();
    assert_eq!(last.termination, TerminationReason::MaxIterations);
    let results: Vec<&str> = last
        .history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(results, vec!["slow", "fast"]);
    assert!(run.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn stalled_tool_call_times_out() {
    let provider = Arc::new(ScriptedProvider::new(vec![make_tool_call_response(
        vec![make_tool_call("manual", json!({}))],
        "",
    )]));
    let agent = AgentLoop::new(provider, "mock-model");
    let mut run = agent
        .run(
            "go",
            registry(),
            RunOptions::new().with_tool_wait_timeout(Duration::from_millis(10)),
        )
        .unwrap();

    let promise = run.next().await.unwrap().unwrap();
    let err = run.next().await.unwrap().unwrap_err();

    assert!(matches!(
        err,
        Error::ToolCall(ToolCallError::WaitTimeout { timeout_ms: 10, .. })
    ));
    assert!(run.is_finished());
    // The call itself is untouched by the timeout.
    assert_eq!(promise.tool_call.unwrap().status(), ToolCallStatus::Pending);
}

#[tokio::test]
async fn collect_runs_deferred_calls_inline() {
    let provider = Arc::new(ScriptedProvider::tool_then_answer(
        vec![make_tool_call("manual", json!({}))],
        "",
        "done",
    ));
    let agent = AgentLoop::new(provider, "mock-model");
    let promises = agent
        .run("go", registry(), RunOptions::new().with_max_iterations(2))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(promises.len(), 2);
    let call = promises[0].tool_call.as_ref().unwrap();
    assert_eq!(call.status(), ToolCallStatus::Completed);
    assert_eq!(promises[1].history[2].content, "ran inline");
}

#[tokio::test]
async fn tool_failures_are_fed_back_to_the_model() {
    let failing = FnTool::new(ToolSchema::new("flaky", "Always fails"), |_| async move {
        Err(ToolError::ExecutionFailed {
            tool_name: "flaky".into(),
            reason: "disk full".into(),
        })
    });
    let registry = Arc::new(ToolRegistry::builder().register(failing).unwrap().build());

    let provider = Arc::new(ScriptedProvider::new(vec![
        make_tool_call_response(
            vec![
                make_tool_call("flaky", json!({})),
                make_tool_call("missing", json!({})),
            ],
            "",
        ),
        make_text_response("recovered"),
    ]));
    let agent = AgentLoop::new(provider, "mock-model");
    let promises = agent
        .run("go", registry, RunOptions::new().with_max_iterations(2))
        .unwrap()
        .collect()
        .await
        .unwrap();

    let last = promises.last().unwrap();
    assert_eq!(last.message.content, "recovered");
    let failures: Vec<&Message> = last.history.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(failures.len(), 2);
    assert!(failures[0].content.contains("disk full"));
    assert!(failures[1].content.contains("missing"));
    assert!(failures.iter().all(|m| m.metadata["status"] == json!("failed")));

    // Dispatches are counted whether or not the tool succeeded.
    assert_eq!(agent.tracker().tool_invocation_count("flaky"), 1);
    assert_eq!(agent.tracker().tool_invocation_count("missing"), 1);
}

#[tokio::test]
async fn enabled_tools_limit_the_offered_schemas() {
    let provider = Arc::new(ScriptedProvider::single_text("ok"));
    let agent = AgentLoop::new(provider.clone(), "mock-model");
    agent
        .run(
            "go",
            registry(),
            RunOptions::new().with_enabled_tools(["finish"]).with_max_iterations(1),
        )
        .unwrap()
        .collect()
        .await
        .unwrap();

    let tools = &provider.requests()[0].tools;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["function"]["name"], "finish");

    let err = agent
        .run("go", registry(), RunOptions::new().with_enabled_tools(["finish", "nope"]))
        .err()
        .unwrap();
    assert!(matches!(err, Error::Tool(ToolError::NotFound(_))));
}

#[tokio::test]
async fn cost_is_accounted_per_context() {
    let pricing = PricingTable::empty();
    pricing.set("priced-model", ModelPricing::new(2.0, 4.0).with_cached(1.0));
    let tracker = Arc::new(RunTracker::with_pricing(pricing));

    let usage = TokenUsage::new(100, 20).with_cached(40);
    let provider = Arc::new(
        ScriptedProvider::new(vec![
            ProviderResponse::new(Message::assistant("a"), "priced-model").with_usage(usage),
            ProviderResponse::new(Message::assistant("b"), "unpriced-model").with_usage(usage),
        ])
        .with_cost_tracking(true),
    );
    let agent = AgentLoop::new(provider, "priced-model").with_tracker(tracker.clone());
    agent
        .run(
            "go",
            registry(),
            RunOptions::new().with_max_iterations(2).with_context_key("billing"),
        )
        .unwrap()
        .collect()
        .await
        .unwrap();

    // 60 uncached at $2/M + 20 output at $4/M + 40 cached at $1/M.
    assert!((tracker.cost("billing") - 0.00024).abs() < 1e-12);
    assert_eq!(tracker.cost("default"), 0.0);

    let stats = tracker.context("billing").unwrap();
    assert_eq!(stats.input_tokens, 200);
    assert_eq!(stats.cached_tokens, 80);
    assert_eq!(stats.generations.len(), 2);
    assert_eq!(stats.generations[1].cost_usd, None);

    let summary = tracker.summary();
    assert!(summary.tracks_cost);
    assert!((summary.cached_ratio - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn shared_tracker_sums_several_runs() {
    let tracker = Arc::new(RunTracker::new());
    let provider = Arc::new(ScriptedProvider::new(vec![
        make_tool_call_response(vec![make_tool_call("echo", json!({"text": "x"}))], ""),
        make_text_response("a"),
        make_text_response("b"),
    ]));
    let agent = AgentLoop::new(provider, "mock-model").with_tracker(tracker.clone());

    for key in ["planner", "worker"] {
        agent
            .run("go", registry(), RunOptions::new().with_max_iterations(1).with_context_key(key))
            .unwrap()
            .collect()
            .await
            .unwrap();
    }

    assert_eq!(tracker.context_keys(), vec!["planner", "worker"]);
    assert_eq!(tracker.tool_invocation_count("echo"), 1);
    // Planner: tool round only. Worker: a single answer round.
    assert_eq!(tracker.context("planner").unwrap().generations.len(), 1);
    assert_eq!(tracker.summary().generations, 2);
}

#[tokio::test]
async fn stream_yields_the_same_promises() {
    let provider = Arc::new(ScriptedProvider::tool_then_answer(
        vec![make_tool_call("echo", json!({"text": "s"}))],
        "",
        "streamed",
    ));
    let agent = AgentLoop::new(provider, "mock-model");
    let run = agent
        .run("go", registry(), RunOptions::new().stop_on_answer())
        .unwrap();

    let promises: Vec<RoundPromise> = run
        .into_stream()
        .map(|p| p.unwrap())
        .collect()
        .await;

    assert_eq!(promises.len(), 2);
    assert_eq!(promises[1].message.content, "streamed");
    assert_eq!(promises[1].termination, TerminationReason::TaskCompleted);
}

#[tokio::test]
async fn history_limit_applies_between_rounds() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        make_text_response("r0"),
        make_text_response("r1"),
        make_text_response("r2"),
    ]));
    let agent = AgentLoop::new(provider.clone(), "mock-model")
        .with_system_prompt("sys")
        .with_hooks(LoopHooks::new().with_history_limit(1));
    agent
        .run("go", registry(), RunOptions::new().with_max_iterations(3))
        .unwrap()
        .collect()
        .await
        .unwrap();

    let sent = provider.requests();
    let last_request: Vec<&str> = sent[2].messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(last_request, vec!["sys", "r1"]);
}

/// Iteration, content, call id, call status and termination of each promise.
type Outline = Vec<(usize, String, Option<String>, Option<ToolCallStatus>, TerminationReason, usize)>;

async fn outline_with(tracker: RunTracker) -> Outline {
    let provider = Arc::new(ScriptedProvider::new(vec![
        make_tool_call_response(
            vec![
                MessageToolCall::new("call_1", "echo", r#"{"text": "one"}"#),
                MessageToolCall::new("call_2", "missing", "{}"),
            ],
            "tools",
        ),
        make_text_response("answer"),
        make_tool_call_response(vec![MessageToolCall::new("call_3", "finish", "{}")], ""),
    ]));
    let agent = AgentLoop::new(provider, "mock-model").with_tracker(Arc::new(tracker));
    agent
        .run("go", registry(), RunOptions::new().with_max_iterations(5))
        .unwrap()
        .collect()
        .await
        .unwrap()
        .into_iter()
        .map(|p| {
            (
                p.iteration,
                p.message.content.clone(),
                p.tool_call.as_ref().map(|c| c.id().to_string()),
                p.tool_call.as_ref().map(|c| c.status()),
                p.termination,
                p.history.len(),
            )
        })
        .collect()
}

#[tokio::test]
async fn verbosity_does_not_change_the_run() {
    let quiet = outline_with(RunTracker::new()).await;
    let verbose = outline_with(RunTracker::new().with_verbose(true)).await;

    assert_eq!(quiet.len(), 5);
    assert_eq!(quiet.last().unwrap().4, TerminationReason::TerminationRequested);
    assert_eq!(quiet, verbose);
}

struct CannedPrompter(&'static str);

#[async_trait]
impl Prompter for CannedPrompter {
    async fn ask(&self, _question: &str) -> std::io::Result<String> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn builtin_tools_drive_a_full_run() {
    let registry = Arc::new(builtin_registry_with(Arc::new(CannedPrompter("blue"))).unwrap());
    let provider = Arc::new(ScriptedProvider::new(vec![
        make_tool_call_response(
            vec![make_tool_call("ask_user", json!({"question": "Favourite colour?"}))],
            "",
        ),
        make_tool_call_response(
            vec![make_tool_call("finish", json!({"answer": "You like blue."}))],
            "",
        ),
    ]));
    let agent = AgentLoop::new(provider, "mock-model");
    let promises = agent
        .run("What do I like?", registry, RunOptions::new())
        .unwrap()
        .collect()
        .await
        .unwrap();

    let ask = promises[0].tool_call.as_ref().unwrap();
    assert_eq!(ask.data().unwrap()["user_answer"], "blue");

    let last = promises.last().unwrap();
    assert_eq!(last.iteration, 1);
    assert_eq!(last.termination, TerminationReason::TerminationRequested);
    assert_eq!(last.history.last().unwrap().content, "You like blue.");
}
