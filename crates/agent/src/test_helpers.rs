//! Shared test helpers: a scripted chat client, test tools, and a wire
//! recorder.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stepwire_core::error::{ProviderError, ToolError};
use stepwire_core::provider::{ChatClient, ChatRequest, ChunkStream, StreamChunk, ToolCallDelta};
use stepwire_core::tool::{Tool, ToolRegistry, ToolResult};
use stepwire_core::wire::{ContentKind, WireListener, WireMessage};
use tokio::sync::mpsc;

/// One scripted model response.
pub enum Turn {
    Chunks(Vec<StreamChunk>),
    Fail(ProviderError),
    FailMidStream(Vec<String>, ProviderError),
}

impl Turn {
    pub fn text(text: &str) -> Self {
        Self::text_fragments(&[text])
    }

    pub fn text_fragments(fragments: &[&str]) -> Self {
        let mut chunks: Vec<StreamChunk> = fragments.iter().map(|f| StreamChunk::text(*f)).collect();
        chunks.push(StreamChunk::finish("stop"));
        Self::Chunks(chunks)
    }

    pub fn reasoning_then_text(reasoning: &str, text: &str) -> Self {
        Self::Chunks(vec![
            StreamChunk {
                reasoning_content: Some(reasoning.into()),
                ..StreamChunk::default()
            },
            StreamChunk::text(text),
        ])
    }

    /// Tool calls as `(id, name, arguments)`, each streamed as an identity
    /// delta followed by the arguments split in two fragments.
    pub fn tool_calls(calls: &[(&str, &str, &str)]) -> Self {
        let mut chunks = Vec::new();
        for (index, (id, name, args)) in calls.iter().enumerate() {
            let index = index as u32;
            chunks.push(StreamChunk::tool_deltas(vec![ToolCallDelta {
                index,
                id: Some((*id).into()),
                kind: Some("function".into()),
                function_name: Some((*name).into()),
                arguments: Some(String::new()),
            }]));
            let mid = args.len() / 2;
            let (head, tail) = if args.is_char_boundary(mid) {
                args.split_at(mid)
            } else {
                (*args, "")
            };
            for part in [head, tail] {
                chunks.push(StreamChunk::tool_deltas(vec![ToolCallDelta {
                    index,
                    arguments: Some(part.into()),
                    ..ToolCallDelta::default()
                }]));
            }
        }
        chunks.push(StreamChunk::finish("tool_calls"));
        Self::Chunks(chunks)
    }
}

/// A chat client that plays back scripted turns, one per call, and records
/// every request it receives.
pub struct ScriptedClient {
    turns: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn generate_stream(&self, request: ChatRequest) -> Result<ChunkStream, ProviderError> {
        self.requests.lock().push(request);
        let turn = self
            .turns
            .lock()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))?;

        let items: Vec<Result<StreamChunk, ProviderError>> = match turn {
            Turn::Fail(e) => return Err(e),
            Turn::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            Turn::FailMidStream(texts, e) => texts
                .into_iter()
                .map(|t| Ok(StreamChunk::text(t)))
                .chain(std::iter::once(Err(e)))
                .collect(),
        };

        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            let _ = tx.try_send(item);
        }
        Ok(rx)
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes the `text` argument"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }
    async fn execute(&self, arguments: &str) -> Result<ToolResult, ToolError> {
        let args: serde_json::Value = serde_json::from_str(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(ToolResult::success(args["text"].as_str().unwrap_or_default()))
    }
}

struct ExplodingTool;

#[async_trait]
impl Tool for ExplodingTool {
    fn name(&self) -> &str {
        "explode"
    }
    fn description(&self) -> &str {
        "Panics"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }
    async fn execute(&self, _arguments: &str) -> Result<ToolResult, ToolError> {
        panic!("tool blew up");
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }
    fn description(&self) -> &str {
        "Always returns an error"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }
    async fn execute(&self, _arguments: &str) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "fail".into(),
            reason: "backend unavailable".into(),
        })
    }
}

/// Registry with `echo`, `explode`, and `fail`.
pub fn test_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(ExplodingTool));
    registry.register(Arc::new(FailingTool));
    registry
}

#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<WireMessage>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<WireMessage> {
        self.seen.lock().clone()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.seen.lock().iter().map(WireMessage::message_type).collect()
    }

    /// Text of normal content parts, in order.
    pub fn content_parts(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter_map(|m| match m {
                WireMessage::ContentPart {
                    text,
                    kind: ContentKind::Normal,
                } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl WireListener for Recorder {
    fn on_message(&self, message: &WireMessage) {
        self.seen.lock().push(message.clone());
    }
}

/// A recorder plus the `Arc<dyn WireListener>` handle that keeps it registered.
pub fn recorder() -> (Arc<Recorder>, Arc<dyn WireListener>) {
    let recorder = Arc::new(Recorder::default());
    let listener: Arc<dyn WireListener> = recorder.clone();
    (recorder, listener)
}
