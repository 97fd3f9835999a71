//! The wire: an event bus for the execution lifecycle.
//!
//! The executor publishes a [`WireMessage`] at every observable point of a
//! run (step start, streamed text, tool call, tool result, interruption).
//! Observers register a [`WireListener`]; the wire holds them weakly so an
//! observer that is dropped simply stops receiving.
//!
//! Two delivery modes exist. `Sync` calls listeners on the sending thread.
//! `Async` hands messages to a dedicated OS thread that drains them in send
//! order, so a slow listener never stalls the agent loop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::message::ToolCallRequest;
use crate::tool::{ToolResult, panic_message};

/// Whether streamed text is the answer itself or the model's reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Normal,
    Reasoning,
}

/// Events published during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// A step is starting
    StepBegin {
        step_no: u32,
        is_sub_step: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
    },

    /// A streamed text fragment
    ContentPart { text: String, kind: ContentKind },

    /// The model requested a tool call; published before it executes
    ToolCall { request: ToolCallRequest },

    /// A tool call finished
    ToolResult {
        tool_call_id: String,
        text: String,
        is_error: bool,
    },

    /// The run stopped abnormally
    StepInterrupted,
}

impl WireMessage {
    pub fn step_begin(step_no: u32, agent_name: Option<String>) -> Self {
        Self::StepBegin {
            step_no,
            is_sub_step: false,
            agent_name,
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self::ContentPart {
            text: text.into(),
            kind: ContentKind::Normal,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::ContentPart {
            text: text.into(),
            kind: ContentKind::Reasoning,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: &ToolResult) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            text: result.render(),
            is_error: result.is_error(),
        }
    }

    /// Stable snake_case name of the variant, matching the serde tag.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::StepBegin { .. } => "step_begin",
            Self::ContentPart { .. } => "content_part",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::StepInterrupted => "step_interrupted",
        }
    }
}

/// An observer of wire traffic.
///
/// Called on the sending thread in `Sync` mode and on the delivery thread in
/// `Async` mode. A panic is caught and logged; it does not reach the sender.
pub trait WireListener: Send + Sync {
    fn on_message(&self, message: &WireMessage);
}

/// How messages reach listeners. Fixed when the wire is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Sync,
    #[default]
    Async,
}

type Snapshot = Arc<Vec<Weak<dyn WireListener>>>;

struct Envelope {
    listeners: Snapshot,
    message: WireMessage,
}

/// The event bus. Share it as `Arc<Wire>`.
pub struct Wire {
    mode: DeliveryMode,
    listeners: RwLock<Snapshot>,
    queue: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Wire {
    /// Build a wire. In `Async` mode this starts the delivery thread; if the
    /// thread cannot be spawned the wire falls back to `Sync` delivery.
    pub fn new(mode: DeliveryMode) -> Self {
        let mut wire = Self {
            mode,
            listeners: RwLock::new(Arc::new(Vec::new())),
            queue: Mutex::new(None),
            worker: Mutex::new(None),
            closed: AtomicBool::new(false),
        };

        if mode == DeliveryMode::Async {
            let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
            let spawned = std::thread::Builder::new()
                .name("wire-delivery".into())
                .spawn(move || {
                    while let Some(envelope) = rx.blocking_recv() {
                        deliver(&envelope.listeners, &envelope.message);
                    }
                    debug!("Wire delivery thread finished");
                });
            match spawned {
                Ok(handle) => {
                    wire.queue = Mutex::new(Some(tx));
                    wire.worker = Mutex::new(Some(handle));
                }
                Err(e) => {
                    error!(error = %e, "Failed to spawn wire delivery thread, delivering synchronously");
                    wire.mode = DeliveryMode::Sync;
                }
            }
        }

        wire
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Register a listener. Registering the same listener twice has no
    /// further effect.
    pub fn add_listener(&self, listener: &Arc<dyn WireListener>) {
        let target = Arc::as_ptr(listener) as *const ();
        let mut guard = self.listeners.write();
        if guard.iter().any(|w| Weak::as_ptr(w) as *const () == target) {
            return;
        }
        let mut next: Vec<Weak<dyn WireListener>> = live(&guard);
        next.push(Arc::downgrade(listener));
        *guard = Arc::new(next);
    }

    /// Unregister a listener. Unknown listeners are ignored.
    pub fn remove_listener(&self, listener: &Arc<dyn WireListener>) {
        let target = Arc::as_ptr(listener) as *const ();
        let mut guard = self.listeners.write();
        let next: Vec<Weak<dyn WireListener>> = live(&guard)
            .into_iter()
            .filter(|w| Weak::as_ptr(w) as *const () != target)
            .collect();
        *guard = Arc::new(next);
    }

    /// Number of registered listeners that are still alive.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Publish a message to the listeners registered right now.
    pub fn send(&self, message: WireMessage) {
        if self.closed.load(Ordering::Acquire) {
            debug!(message_type = message.message_type(), "Wire is shut down, dropping message");
            return;
        }

        let listeners = Arc::clone(&self.listeners.read());

        match self.mode {
            DeliveryMode::Sync => deliver(&listeners, &message),
            DeliveryMode::Async => {
                let queue = self.queue.lock();
                let Some(tx) = queue.as_ref() else {
                    debug!(message_type = message.message_type(), "Wire queue closed, dropping message");
                    return;
                };
                if tx.send(Envelope { listeners, message }).is_err() {
                    warn!("Wire delivery thread is gone, message dropped");
                }
            }
        }
    }

    /// Stop accepting messages and wait for queued ones to be delivered.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(self.queue.lock().take());

        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        // A listener calling shutdown would otherwise join its own thread.
        if handle.thread().id() == std::thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("Wire delivery thread panicked");
        }
    }
}

impl Drop for Wire {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new(DeliveryMode::default())
    }
}

impl std::fmt::Debug for Wire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wire")
            .field("mode", &self.mode)
            .field("listeners", &self.listener_count())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn live(snapshot: &Snapshot) -> Vec<Weak<dyn WireListener>> {
    snapshot
        .iter()
        .filter(|w| w.strong_count() > 0)
        .cloned()
        .collect()
}

fn deliver(listeners: &[Weak<dyn WireListener>], message: &WireMessage) {
    for weak in listeners {
        let Some(listener) = weak.upgrade() else {
            continue;
        };
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener.on_message(message))) {
            warn!(
                message_type = message.message_type(),
                reason = %panic_message(panic.as_ref()),
                "Wire listener panicked"
            );
        }
    }
}
