//! The chat client trait, the abstraction over streaming LLM backends.
//!
//! A [`ChatClient`] turns a request (system prompt, history, tool schemas)
//! into a stream of partial response chunks. Implementations live in the
//! providers crate: an OpenAI-compatible SSE client and a null client that
//! stands in when no model is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// The stream of chunks produced by one model call.
///
/// Items arrive in emission order. A transport failure is delivered as a
/// single `Err` item, after which the channel closes; a normal end of stream
/// is simply the channel closing.
pub type ChunkStream = mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// Everything a model call needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Sent as the leading system message
    pub system_prompt: String,

    /// The conversation so far, in order
    pub history: Vec<Message>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A partial tool-call update, keyed by position index.
///
/// `id`, `kind`, and `function_name` are normally present only in the first
/// delta for an index; `arguments` is a fragment to be appended to every
/// earlier fragment at the same index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A single increment of a streamed model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Partial reasoning delta (reasoning models only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,

    /// Partial tool call deltas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    /// Why the model stopped (`stop`, `tool_calls`, `length`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A chunk carrying only a content fragment.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying only tool-call deltas.
    pub fn tool_deltas(deltas: Vec<ToolCallDelta>) -> Self {
        Self {
            tool_calls: deltas,
            ..Self::default()
        }
    }

    /// A chunk carrying only a finish reason.
    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn has_reasoning(&self) -> bool {
        self.reasoning_content.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// The streaming chat client boundary.
///
/// The agent loop calls `generate_stream()` without knowing which backend is
/// behind it, either an HTTP endpoint or the null client used when no model is
/// configured.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai", "null").
    fn name(&self) -> &str;

    /// The model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Start a model call and return its chunk stream.
    ///
    /// Errors detected before any chunk is produced (connection refused,
    /// non-2xx status) are returned directly.
    async fn generate_stream(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<ChunkStream, ProviderError>;

    /// Release held resources. Idempotent; later calls to
    /// `generate_stream` fail with [`ProviderError::Shutdown`].
    fn shutdown(&self) {}
}
