//! The engine: one agent, one conversation, one background worker.
//!
//! Callers submit inputs with [`Engine::run`] and await the returned
//! [`RunHandle`]. Runs are queued and executed one at a time by a tokio
//! task that owns the [`AgentExecutor`]; the conversation [`Context`] is
//! locked for the whole of each run, so history operations wait for an
//! in-flight run to finish.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use parking_lot::Mutex;
use stepwire_core::agent::Agent;
use stepwire_core::context::Context;
use stepwire_core::error::{EngineError, Error, Result};
use stepwire_core::message::Message;
use stepwire_core::provider::ChatClient;
use stepwire_core::tool::{Tool, ToolRegistry};
use stepwire_core::wire::{DeliveryMode, Wire, WireListener};
use stepwire_providers::NullChatClient;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::compaction::{Compaction, SimpleCompaction};
use crate::executor::{AgentExecutor, ExecutorLimits, ExecutorState, RunOutcome};

struct RunRequest {
    input: String,
    reply: oneshot::Sender<Result<RunOutcome>>,
}

/// Completion of a submitted run. Await it for the outcome.
#[must_use = "a run's outcome is only observable through its handle"]
pub struct RunHandle {
    rx: oneshot::Receiver<Result<RunOutcome>>,
}

impl RunHandle {
    fn failed(error: Error) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { rx }
    }
}

impl Future for RunHandle {
    type Output = Result<RunOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(EngineError::WorkerGone.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct Engine {
    agent: Arc<Agent>,
    model: String,
    wire: Arc<Wire>,
    context: Arc<tokio::sync::Mutex<Context>>,
    requests: Mutex<Option<mpsc::UnboundedSender<RunRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: watch::Receiver<ExecutorState>,
}

impl Engine {
    pub fn builder(agent: impl Into<Arc<Agent>>) -> EngineBuilder {
        EngineBuilder::new(agent.into())
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn wire(&self) -> &Arc<Wire> {
        &self.wire
    }

    /// Queue a run. After [`shutdown`](Self::shutdown) the handle resolves
    /// to [`EngineError::ShutDown`].
    pub fn run(&self, input: impl Into<String>) -> RunHandle {
        let guard = self.requests.lock();
        let Some(requests) = guard.as_ref() else {
            return RunHandle::failed(EngineError::ShutDown.into());
        };

        let (reply, rx) = oneshot::channel();
        let request = RunRequest {
            input: input.into(),
            reply,
        };
        if requests.send(request).is_err() {
            return RunHandle::failed(EngineError::WorkerGone.into());
        }
        RunHandle { rx }
    }

    pub fn add_listener(&self, listener: &Arc<dyn WireListener>) {
        self.wire.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn WireListener>) {
        self.wire.remove_listener(listener);
    }

    /// Wipe the conversation. Waits for an in-flight run to finish first.
    pub async fn clear_history(&self) {
        self.context.lock().await.clear();
        debug!(agent = %self.agent.name(), "History cleared");
    }

    /// A copy of the conversation so far. Waits for an in-flight run.
    pub async fn history(&self) -> Vec<Message> {
        self.context.lock().await.history().to_vec()
    }

    pub async fn token_count(&self) -> u32 {
        self.context.lock().await.token_count()
    }

    pub fn state(&self) -> ExecutorState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ExecutorState> {
        self.state.clone()
    }

    /// Stop accepting runs, let queued runs finish, then drain and stop the
    /// wire. Idempotent.
    pub async fn shutdown(&self) {
        let sender = self.requests.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        let wire = Arc::clone(&self.wire);
        let _ = tokio::task::spawn_blocking(move || wire.shutdown()).await;
        info!(agent = %self.agent.name(), "Engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.requests.lock().is_none()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("agent", &self.agent.name())
            .field("model", &self.model)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

async fn worker_loop(
    mut executor: AgentExecutor,
    context: Arc<tokio::sync::Mutex<Context>>,
    mut requests: mpsc::UnboundedReceiver<RunRequest>,
) {
    while let Some(request) = requests.recv().await {
        let mut ctx = context.lock().await;
        let result = executor.execute(&mut ctx, &request.input).await;
        drop(ctx);

        if request.reply.send(result).is_err() {
            debug!("Run handle dropped before completion");
        }
    }
    debug!(agent = %executor.agent().name(), "Engine worker stopped");
}

/// Assembles an [`Engine`].
///
/// Defaults: [`NullChatClient`], no tools, [`SimpleCompaction`], an async
/// wire, and default limits.
pub struct EngineBuilder {
    agent: Arc<Agent>,
    client: Option<Arc<dyn ChatClient>>,
    tools: ToolRegistry,
    compaction: Option<Arc<dyn Compaction>>,
    wire: Option<Arc<Wire>>,
    delivery: DeliveryMode,
    limits: ExecutorLimits,
}

impl EngineBuilder {
    fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            client: None,
            tools: ToolRegistry::new(),
            compaction: None,
            wire: None,
            delivery: DeliveryMode::default(),
            limits: ExecutorLimits::default(),
        }
    }

    pub fn client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn compaction(mut self, compaction: Arc<dyn Compaction>) -> Self {
        self.compaction = Some(compaction);
        self
    }

    /// Use an existing wire instead of creating one.
    pub fn wire(mut self, wire: Arc<Wire>) -> Self {
        self.wire = Some(wire);
        self
    }

    /// Delivery mode for the wire this builder creates.
    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery = mode;
        self
    }

    pub fn limits(mut self, limits: ExecutorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.limits.max_steps = max_steps;
        self
    }

    /// Build the engine and start its worker. Must be called inside a
    /// tokio runtime.
    pub fn build(self) -> Result<Engine> {
        if self.limits.max_steps == 0 {
            return Err(Error::config("max_steps must be > 0"));
        }
        if self.limits.reserved_tokens >= self.limits.max_context_size {
            return Err(Error::config(
                "reserved_tokens must be smaller than max_context_size",
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("engine needs a tokio runtime: {e}")))?;

        let client: Arc<dyn ChatClient> = match self.client {
            Some(client) => client,
            None => Arc::new(NullChatClient::new()),
        };
        let model = client.model().to_string();
        let wire = match self.wire {
            Some(wire) => wire,
            None => Arc::new(Wire::new(self.delivery)),
        };
        let compaction: Arc<dyn Compaction> = match self.compaction {
            Some(compaction) => compaction,
            None => Arc::new(SimpleCompaction::default()),
        };

        let executor = AgentExecutor::new(
            Arc::clone(&self.agent),
            client,
            Arc::new(self.tools),
            Arc::clone(&wire),
        )
        .with_compaction(compaction)
        .with_limits(self.limits);
        let state = executor.subscribe_state();

        let context = Arc::new(tokio::sync::Mutex::new(Context::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = runtime.spawn(worker_loop(executor, Arc::clone(&context), rx));

        info!(agent = %self.agent.name(), model = %model, "Engine started");

        Ok(Engine {
            agent: self.agent,
            model,
            wire,
            context,
            requests: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use stepwire_core::message::Role;
    use stepwire_providers::NULL_RESPONSE;

    fn agent() -> Agent {
        Agent::builder()
            .name("engine-test")
            .system_prompt("You are under test.")
            .tool("echo")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn default_engine_uses_null_client() {
        let engine = Engine::builder(agent()).build().unwrap();
        assert_eq!(engine.model(), "null");
        assert_eq!(engine.name(), "engine-test");

        let outcome = engine.run("hello").await.unwrap();
        assert_eq!(outcome.content, NULL_RESPONSE);
        assert_eq!(engine.history().await.len(), 2);
        assert_eq!(engine.state(), ExecutorState::Done { steps: 1 });
    }

    #[tokio::test]
    async fn runs_execute_serially_in_submission_order() {
        let client = Arc::new(ScriptedClient::new(vec![
            Turn::text("first"),
            Turn::text("second"),
        ]));
        let engine = Engine::builder(agent())
            .client(client)
            .delivery_mode(DeliveryMode::Sync)
            .build()
            .unwrap();

        let a = engine.run("one");
        let b = engine.run("two");
        assert_eq!(a.await.unwrap().content, "first");
        assert_eq!(b.await.unwrap().content, "second");

        let texts: Vec<String> = engine
            .history()
            .await
            .iter()
            .map(|m| m.text().to_string())
            .collect();
        assert_eq!(texts, vec!["one", "first", "two", "second"]);
    }

    #[tokio::test]
    async fn listeners_see_events_and_clear_history_resets() {
        let client = Arc::new(ScriptedClient::new(vec![
            Turn::tool_calls(&[("c1", "echo", r#"{"text":"hi"}"#)]),
            Turn::text("bye"),
        ]));
        let engine = Engine::builder(agent())
            .client(client)
            .tools(test_registry())
            .build()
            .unwrap();
        let (rec, listener) = recorder();
        engine.add_listener(&listener);

        engine.run("start").await.unwrap();
        engine.shutdown().await;

        assert_eq!(
            rec.types(),
            vec!["step_begin", "tool_call", "tool_result", "step_begin", "content_part"]
        );

        engine.clear_history().await;
        assert!(engine.history().await.is_empty());
        assert_eq!(engine.token_count().await, 0);
    }

    #[tokio::test]
    async fn removed_listener_stops_receiving() {
        let engine = Engine::builder(agent())
            .delivery_mode(DeliveryMode::Sync)
            .build()
            .unwrap();
        let (rec, listener) = recorder();
        engine.add_listener(&listener);
        engine.run("a").await.unwrap();
        let seen = rec.seen().len();

        engine.remove_listener(&listener);
        engine.run("b").await.unwrap();
        assert_eq!(rec.seen().len(), seen);
    }

    #[tokio::test]
    async fn failed_run_surfaces_through_handle() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let engine = Engine::builder(agent()).client(client).build().unwrap();
        let err = engine.run("hi").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(matches!(engine.state(), ExecutorState::Failed { step: 1, .. }));

        // The engine keeps serving after a failed run.
        let history = engine.history().await;
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn run_after_shutdown_is_rejected() {
        let engine = Engine::builder(agent()).build().unwrap();
        engine.shutdown().await;
        engine.shutdown().await;
        assert!(engine.is_shut_down());

        let err = engine.run("late").await.unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::ShutDown)));
    }

    #[tokio::test]
    async fn queued_runs_finish_before_shutdown_completes() {
        let engine = Engine::builder(agent()).build().unwrap();
        let pending = engine.run("queued");
        engine.shutdown().await;
        assert!(pending.await.is_ok());
    }

    #[tokio::test]
    async fn invalid_limits_rejected() {
        let err = Engine::builder(agent()).max_steps(0).build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn build_outside_runtime_fails() {
        let err = Engine::builder(agent()).build().unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
