//! The agent loop implementation.
//!
//! [`AgentLoop::run`] returns an [`AgentRun`], a pull-based sequence of
//! [`RoundPromise`]s. Each call to [`AgentRun::next`] performs at most one
//! model call or one tool dispatch, so the caller decides when a round
//! advances and can hand deferred tool calls to other tasks in between.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use futures::Stream;
use toolrun_config::{AppConfig, ConfigError};
use toolrun_core::{
    DispatchMode, Error, Message, MessageToolCall, Provider, ProviderRequest, ProviderResponse,
    ReasoningEffort, Result, SchemaBuilder, TerminationReason, ToolCall, ToolCallStatus,
    ToolRegistry,
};
use toolrun_providers::ChatCompletionsSchema;
use toolrun_telemetry::{ModelPricing, PricingTable, RunTracker, DEFAULT_CONTEXT_KEY};
use tracing::{debug, info, warn};
use crate::hooks::LoopHooks;
use crate::round::RoundPromise;

const DEFAULT_MAX_ITERATIONS: usize = 256;

/// What a run starts from.
#[derive(Debug, Clone)]
pub enum RunInput {
    /// Seeded as the system prompt (if any) plus this user message.
    Prompt(String),
    /// An existing conversation; the system prompt is not added.
    History(Vec<Message>),
}

impl From<&str> for RunInput {
    fn from(prompt: &str) -> Self {
        Self::Prompt(prompt.to_string())
    }
}

impl From<String> for RunInput {
    fn from(prompt: String) -> Self {
        Self::Prompt(prompt)
    }
}

impl From<Vec<Message>> for RunInput {
    fn from(history: Vec<Message>) -> Self {
        Self::History(history)
    }
}

/// Per-run settings. Anything left unset falls back to the loop's defaults.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Tools offered to the model; `None` offers every registered tool.
    pub enabled_tools: Option<Vec<String>>,
    pub max_iterations: Option<usize>,
    pub context_key: Option<String>,
    /// Upper bound on waiting for a tool call on the next pull.
    pub tool_wait_timeout: Option<Duration>,
    /// End the run with `TaskCompleted` as soon as the model answers
    /// without requesting tools.
    pub stop_on_answer: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = Some(key.into());
        self
    }

    pub fn with_tool_wait_timeout(mut self, timeout: Duration) -> Self {
        self.tool_wait_timeout = Some(timeout);
        self
    }

    pub fn stop_on_answer(mut self) -> Self {
        self.stop_on_answer = true;
        self
    }
}

/// Drives a conversation between a model and a set of tools.
#[derive(Clone)]
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    reasoning_effort: Option<ReasoningEffort>,

    /// Structured-output schema passed through to the backend
    response_format: Option<serde_json::Value>,

    /// Seeded ahead of a prompt input
    system_prompt: Option<String>,

    /// Default bound on rounds per run
    max_iterations: usize,

    /// Default accounting bucket
    context_key: String,

    /// Default bound on tool-call waits
    tool_wait_timeout: Option<Duration>,

    /// Shapes tool schemas for the backend
    schema_builder: Arc<dyn SchemaBuilder>,

    tracker: Arc<RunTracker>,

    hooks: LoopHooks,
}

impl AgentLoop {
    /// Create a new agent loop with default settings.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            reasoning_effort: None,
            response_format: None,
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            context_key: DEFAULT_CONTEXT_KEY.to_string(),
            tool_wait_timeout: None,
            schema_builder: Arc::new(ChatCompletionsSchema),
            tracker: Arc::new(RunTracker::new()),
            hooks: LoopHooks::default(),
        }
    }

    /// Build a loop from configuration.
    ///
    /// Pricing overrides are merged over the built-in table and the schema
    /// shape is picked from the provider's name.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let pricing = PricingTable::with_defaults();
        pricing.extend(config.telemetry.custom_pricing.iter().map(|(model, p)| {
            let mut pricing = ModelPricing::new(p.input_per_m, p.output_per_m);
            pricing.cached_input_per_m = p.cached_input_per_m;
            (model.clone(), pricing)
        }));
        let tracker = RunTracker::with_pricing(pricing)
            .with_verbose(config.agent.verbose)
            .with_cost_tracking(config.telemetry.track_cost);

        let schema_builder: Arc<dyn SchemaBuilder> =
            Arc::from(toolrun_providers::for_backend(provider.name()));

        let mut agent = Self::new(provider, config.model.clone())
            .with_temperature(config.temperature)
            .with_max_iterations(config.agent.max_iterations)
            .with_context_key(config.agent.context_key.clone())
            .with_schema_builder(schema_builder)
            .with_tracker(Arc::new(tracker));
        agent.max_tokens = config.max_tokens;
        agent.reasoning_effort = config.reasoning_effort;
        agent.system_prompt = config.system_prompt.clone();
        agent.tool_wait_timeout = config.agent.tool_wait_timeout_secs.map(Duration::from_secs);
        Ok(agent)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn with_response_format(mut self, format: serde_json::Value) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the default number of rounds per run.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    pub fn with_tool_wait_timeout(mut self, timeout: Duration) -> Self {
        self.tool_wait_timeout = Some(timeout);
        self
    }

    pub fn with_schema_builder(mut self, builder: Arc<dyn SchemaBuilder>) -> Self {
        self.schema_builder = builder;
        self
    }

    /// Share a tracker between loops, e.g. a planner and its workers.
    pub fn with_tracker(mut self, tracker: Arc<RunTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_hooks(mut self, hooks: LoopHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn tracker(&self) -> &Arc<RunTracker> {
        &self.tracker
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Start a run.
    ///
    /// Fails up front when an enabled tool is not registered or the
    /// iteration bound is zero; nothing is sent to the model until the first
    /// [`AgentRun::next`].
    pub fn run(
        &self,
        input: impl Into<RunInput>,
        registry: Arc<ToolRegistry>,
        options: RunOptions,
    ) -> Result<AgentRun> {
        let max_iterations = options.max_iterations.unwrap_or(self.max_iterations);
        if max_iterations == 0 {
            return Err(Error::Config {
                message: "max_iterations must be at least 1".into(),
            });
        }

        let schemas = registry.resolve_schemas(options.enabled_tools.as_deref())?;
        let tools = self.schema_builder.build_all(&schemas);
        let context_key = options.context_key.unwrap_or_else(|| self.context_key.clone());

        info!(
            model = %self.model,
            context = %context_key,
            max_iterations,
            tools = tools.len(),
            schema = self.schema_builder.name(),
            "Starting agent run"
        );

        Ok(AgentRun {
            agent: self.clone(),
            registry,
            tools,
            history: self.seed(input.into()),
            max_iterations,
            context_key,
            tool_wait_timeout: options.tool_wait_timeout.or(self.tool_wait_timeout),
            stop_on_answer: options.stop_on_answer,
            iteration: 0,
            state: RunState::Generate,
        })
    }

    /// One tracked model call without tools.
    pub async fn complete_once(&self, prompt: &str, context_key: Option<&str>) -> Result<ProviderResponse> {
        let history = self.seed(RunInput::Prompt(prompt.to_string()));
        let response = self.generate(&history, Vec::new()).await?;
        self.tracker.record_generation(
            self.provider.as_ref(),
            &response,
            context_key.unwrap_or(&self.context_key),
        );
        Ok(response)
    }

    fn seed(&self, input: RunInput) -> Vec<Message> {
        match input {
            RunInput::History(history) => history,
            RunInput::Prompt(prompt) => {
                let mut messages = Vec::with_capacity(2);
                if let Some(system) = &self.system_prompt {
                    messages.push(Message::system(system));
                }
                if !prompt.is_empty() {
                    messages.push(Message::user(prompt));
                }
                messages
            }
        }
    }

    /// Call the model, routing content-filter refusals through the hook.
    async fn generate(&self, history: &[Message], tools: Vec<serde_json::Value>) -> Result<ProviderResponse> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: history.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            reasoning_effort: self.reasoning_effort,
            tools,
            response_format: self.response_format.clone(),
        };

        match self.provider.complete(request).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_content_filtered() => {
                warn!(provider = self.provider.name(), "Response blocked by content filter");
                Ok((self.hooks.on_content_filtered)(e, history)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

enum RunState {
    /// Next pull calls the model.
    Generate,
    /// Working through the tool calls of the current round.
    Tools {
        base: RoundPromise,
        pending: VecDeque<MessageToolCall>,
        /// Yielded on the previous pull; must be terminal before we go on.
        awaiting: Option<ToolCall>,
    },
    Finished,
}

/// A run in progress. Pull it with [`next`](Self::next) or turn it into a
/// stream; drop it to cancel.
pub struct AgentRun {
    agent: AgentLoop,
    registry: Arc<ToolRegistry>,
    tools: Vec<serde_json::Value>,
    history: Vec<Message>,
    max_iterations: usize,
    context_key: String,
    tool_wait_timeout: Option<Duration>,
    stop_on_answer: bool,
    iteration: usize,
    state: RunState,
}

impl AgentRun {
    /// Produce the next promise, or `None` once the run has ended.
    ///
    /// If the previous promise carried a tool call, this first waits for it
    /// to finish and appends its result. An `Err` ends the run.
    pub async fn next(&mut self) -> Option<Result<RoundPromise>> {
        let step = self.step().await;
        if matches!(step, Some(Err(_))) {
            self.state = RunState::Finished;
        }
        step
    }

    /// Adapt the run to a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<RoundPromise>> + Send {
        futures::stream::unfold(self, |mut run| async move {
            let item = run.next().await?;
            Some((item, run))
        })
    }

    /// Run to the end, executing deferred tool calls inline.
    pub async fn collect(mut self) -> Result<Vec<RoundPromise>> {
        let mut promises = Vec::new();
        while let Some(promise) = self.next().await {
            let promise = promise?;
            if let Some(call) = &promise.tool_call {
                if call.status() == ToolCallStatus::Pending
                    && call.dispatch_mode() == Some(DispatchMode::Deferred)
                {
                    call.execute().await?;
                }
            }
            promises.push(promise);
        }
        Ok(promises)
    }

    /// Current history, including results appended since the last promise.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Index of the round in progress.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Finished)
    }

    async fn step(&mut self) -> Option<Result<RoundPromise>> {
        loop {
            match std::mem::replace(&mut self.state, RunState::Finished) {
                RunState::Finished => return None,
                RunState::Generate => {
                    let base = match self.start_round().await {
                        Ok(base) => base,
                        Err(e) => return Some(Err(e)),
                    };

                    if base.response.tool_calls().is_empty() {
                        return Some(Ok(self.answer_round(base)));
                    }

                    debug!(
                        iteration = self.iteration,
                        tool_count = base.response.tool_calls().len(),
                        "Dispatching tool calls"
                    );
                    let pending = base.response.tool_calls().iter().cloned().collect();
                    self.state = RunState::Tools {
                        base,
                        pending,
                        awaiting: None,
                    };
                }
                RunState::Tools {
                    base,
                    mut pending,
                    awaiting,
                } => {
                    if let Some(call) = awaiting {
                        match self.finish_tool_call(&call).await {
                            Ok(true) => return Some(Ok(self.terminate(base, call))),
                            Ok(false) => {}
                            Err(e) => return Some(Err(e)),
                        }
                    }

                    if let Some(request) = pending.pop_front() {
                        let call = ToolCall::from_request(&request);
                        self.agent.tracker.record_tool_dispatch(&call, &self.context_key);
                        if let Err(e) = call.dispatch(&self.registry).await {
                            return Some(Err(e.into()));
                        }

                        let mut promise = base.clone();
                        promise.tool_call = Some(call.clone());
                        promise.history = self.history.clone();
                        self.state = RunState::Tools {
                            base,
                            pending,
                            awaiting: Some(call),
                        };
                        return Some(Ok(promise));
                    }

                    self.end_round();
                    if self.iteration >= self.max_iterations {
                        return Some(Ok(self.exhausted(base)));
                    }
                    self.state = RunState::Generate;
                }
            }
        }
    }

    /// Model call, accounting and history update for the current round.
    async fn start_round(&mut self) -> Result<RoundPromise> {
        let i = self.iteration;
        debug!(iteration = i, messages = self.history.len(), "Agent loop iteration");

        let response = self.agent.generate(&self.history, self.tools.clone()).await?;
        self.agent
            .tracker
            .record_generation(self.agent.provider.as_ref(), &response, &self.context_key);

        self.history.push(response.message.clone());
        (self.agent.hooks.on_response)(i, &response, &self.history);

        Ok(RoundPromise::new(i, response))
    }

    /// The single promise of a round without tool calls.
    fn answer_round(&mut self, mut promise: RoundPromise) -> RoundPromise {
        promise.history = self.history.clone();
        promise.termination = if self.stop_on_answer {
            TerminationReason::TaskCompleted
        } else if self.iteration + 1 >= self.max_iterations {
            TerminationReason::MaxIterations
        } else {
            TerminationReason::None
        };

        if promise.is_terminal() {
            info!(iteration = self.iteration, reason = %promise.termination, "Agent run finished");
            self.agent.tracker.record_termination(promise.termination);
        } else {
            self.end_round();
            self.state = RunState::Generate;
        }
        promise
    }

    /// Wait for a yielded call and append its result. Returns whether the
    /// call asked the loop to stop.
    async fn finish_tool_call(&mut self, call: &ToolCall) -> Result<bool> {
        call.wait(self.tool_wait_timeout).await?;
        let result = call.to_result_message()?;

        if !call.is_successful() {
            warn!(tool = call.name(), call_id = call.id(), "Tool call failed");
        }

        self.history.push(result.clone());
        self.agent.tracker.record_tool_result(call);
        (self.agent.hooks.after_tool)(self.iteration, call, &result);
        Ok(call.is_termination())
    }

    fn terminate(&mut self, base: RoundPromise, call: ToolCall) -> RoundPromise {
        info!(
            iteration = self.iteration,
            tool = call.name(),
            "Termination requested by tool"
        );
        self.agent
            .tracker
            .record_termination(TerminationReason::TerminationRequested);

        let mut promise = base;
        promise.tool_call = Some(call);
        promise.history = self.history.clone();
        promise.termination = TerminationReason::TerminationRequested;
        promise
    }

    /// Trailing promise after the last allowed round dispatched tools.
    fn exhausted(&mut self, base: RoundPromise) -> RoundPromise {
        info!(max_iterations = self.max_iterations, "Max iterations reached");
        self.agent.tracker.record_termination(TerminationReason::MaxIterations);

        let mut promise = base;
        promise.tool_call = None;
        promise.history = self.history.clone();
        promise.termination = TerminationReason::MaxIterations;
        promise
    }

    /// Apply the end-of-round transform and advance the round counter.
    fn end_round(&mut self) {
        let history = std::mem::take(&mut self.history);
        self.history = (self.agent.hooks.end_of_round)(self.iteration, history);
        self.iteration += 1;
    }
}
