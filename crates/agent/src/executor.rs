//! The step loop.
//!
//! A run is a sequence of steps. Each step streams one model response,
//! records it in the context, and executes any tool calls it requested.
//! The run ends at the first step whose response asks for no tools, or
//! fails when the step budget is exhausted or the model call fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stepwire_config::EngineConfig;
use stepwire_core::accumulator::ToolCallAccumulator;
use stepwire_core::agent::Agent;
use stepwire_core::context::Context;
use stepwire_core::error::{EngineError, Result};
use stepwire_core::message::{Message, ToolCallRequest};
use stepwire_core::provider::{ChatClient, ChatRequest, Usage};
use stepwire_core::tool::ToolRegistry;
use stepwire_core::wire::{Wire, WireMessage};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::compaction::{Compaction, SimpleCompaction};
use crate::token::estimate_tokens;

/// Budgets that bound a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorLimits {
    pub max_steps: u32,
    pub max_context_size: u32,
    pub reserved_tokens: u32,
}

impl ExecutorLimits {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_steps: config.max_steps_per_run,
            max_context_size: config.max_context_size,
            reserved_tokens: config.reserved_tokens,
        }
    }

    /// Compaction runs before a step once the estimate exceeds this.
    pub fn compaction_threshold(&self) -> u32 {
        self.max_context_size.saturating_sub(self.reserved_tokens)
    }
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Where the executor is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutorState {
    Idle,
    Running { step: u32 },
    Done { steps: u32 },
    Failed { step: u32, reason: String },
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Steps taken, including the final one
    pub steps: u32,
    /// Tool calls dispatched across all steps
    pub tool_calls: u32,
    /// Text of the final assistant message
    pub content: String,
    /// Last usage report from the model, if any
    pub usage: Option<Usage>,
}

/// What one streamed model response produced.
struct StepOutput {
    content: String,
    tool_calls: Vec<ToolCallRequest>,
    usage: Option<Usage>,
}

/// Drives runs for one agent.
pub struct AgentExecutor {
    agent: Arc<Agent>,
    client: Arc<dyn ChatClient>,
    tools: Arc<ToolRegistry>,
    wire: Arc<Wire>,
    compaction: Arc<dyn Compaction>,
    limits: ExecutorLimits,
    state: watch::Sender<ExecutorState>,
    consecutive_no_tool_calls: u32,
}

impl AgentExecutor {
    pub fn new(
        agent: Arc<Agent>,
        client: Arc<dyn ChatClient>,
        tools: Arc<ToolRegistry>,
        wire: Arc<Wire>,
    ) -> Self {
        let (state, _) = watch::channel(ExecutorState::Idle);
        Self {
            agent,
            client,
            tools,
            wire,
            compaction: Arc::new(SimpleCompaction::default()),
            limits: ExecutorLimits::default(),
            state,
            consecutive_no_tool_calls: 0,
        }
    }

    pub fn with_compaction(mut self, compaction: Arc<dyn Compaction>) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn with_limits(mut self, limits: ExecutorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    pub fn limits(&self) -> ExecutorLimits {
        self.limits
    }

    pub fn state(&self) -> ExecutorState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ExecutorState> {
        self.state.subscribe()
    }

    /// Steps in a row that ended without tool calls.
    pub fn consecutive_no_tool_calls(&self) -> u32 {
        self.consecutive_no_tool_calls
    }

    /// Run the agent on one user input until it stops asking for tools.
    pub async fn execute(&mut self, context: &mut Context, input: &str) -> Result<RunOutcome> {
        info!(
            agent = %self.agent.name(),
            model = %self.client.model(),
            history = context.len(),
            "Run started"
        );

        context.checkpoint(false);
        context.append(Message::user(input));
        context.add_tokens(estimate_tokens(input));

        let mut outcome = RunOutcome::default();
        let mut step_no = 0u32;

        loop {
            step_no += 1;
            match self.run_step(context, step_no, &mut outcome).await {
                Ok(true) => {
                    outcome.steps = step_no;
                    self.state.send_replace(ExecutorState::Done { steps: step_no });
                    info!(
                        agent = %self.agent.name(),
                        steps = step_no,
                        tool_calls = outcome.tool_calls,
                        tokens = context.token_count(),
                        "Run finished"
                    );
                    return Ok(outcome);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(agent = %self.agent.name(), step = step_no, error = %e, "Run interrupted");
                    self.wire.send(WireMessage::StepInterrupted);
                    self.state.send_replace(ExecutorState::Failed {
                        step: step_no,
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }
    }

    /// One iteration of the loop. `Ok(true)` means the run is finished.
    async fn run_step(
        &mut self,
        context: &mut Context,
        step_no: u32,
        outcome: &mut RunOutcome,
    ) -> Result<bool> {
        if step_no > self.limits.max_steps {
            return Err(EngineError::StepBudgetExceeded {
                max_steps: self.limits.max_steps,
            }
            .into());
        }

        self.state.send_replace(ExecutorState::Running { step: step_no });
        self.wire.send(WireMessage::step_begin(
            step_no,
            Some(self.agent.name().to_string()),
        ));
        debug!(step = step_no, tokens = context.token_count(), "Step started");

        if context.token_count() > self.limits.compaction_threshold() {
            self.compaction.compact(context);
        }
        context.checkpoint(true);

        let output = self.step(context).await?;
        if output.usage.is_some() {
            outcome.usage = output.usage;
        }

        if output.tool_calls.is_empty() {
            self.consecutive_no_tool_calls += 1;
            outcome.content = output.content;
            return Ok(true);
        }

        self.consecutive_no_tool_calls = 0;
        for call in output.tool_calls {
            self.dispatch(context, call).await;
            outcome.tool_calls += 1;
        }
        Ok(false)
    }

    /// Stream one model response and append it to the context.
    async fn step(&self, context: &mut Context) -> Result<StepOutput> {
        // An agent with no tool list may use every registered tool.
        let tools = self.tools.definitions(self.agent.tools());
        let request = ChatRequest {
            system_prompt: self.agent.system_prompt().to_string(),
            history: context.history().to_vec(),
            tools,
        };

        let mut stream = self.client.generate_stream(request).await?;
        let mut content = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        let mut usage = None;

        while let Some(item) = stream.recv().await {
            let chunk = item?;

            if let Some(reasoning) = chunk.reasoning_content.filter(|r| !r.is_empty()) {
                self.wire.send(WireMessage::reasoning(reasoning));
            }
            if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                content.push_str(&text);
                self.wire.send(WireMessage::content(text));
            }
            for delta in &chunk.tool_calls {
                accumulator.accumulate(delta);
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
        }

        let tool_calls = accumulator.build();
        debug!(
            chars = content.len(),
            tool_calls = tool_calls.len(),
            "Model response complete"
        );

        let message = if tool_calls.is_empty() {
            Message::assistant(content.clone())
        } else {
            Message::assistant_with_tools(content.clone(), tool_calls.clone())
        };
        context.append(message);
        context.add_tokens(estimate_tokens(&content));

        Ok(StepOutput {
            content,
            tool_calls,
            usage,
        })
    }

    async fn dispatch(&self, context: &mut Context, call: ToolCallRequest) {
        debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        self.wire.send(WireMessage::ToolCall {
            request: call.clone(),
        });

        let result = self.tools.execute(&call.name, &call.arguments).await;
        self.wire.send(WireMessage::tool_result(&call.id, &result));

        let text = result.render();
        context.add_tokens(estimate_tokens(&text));
        context.append(Message::tool_result(call.id, text));
    }
}
