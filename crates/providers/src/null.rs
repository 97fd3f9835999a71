//! A chat client for running without a model.
//!
//! Streams one fixed placeholder reply with no tool calls, so any run that
//! uses it finishes after a single step.

use async_trait::async_trait;
use stepwire_core::error::ProviderError;
use stepwire_core::provider::{ChatClient, ChatRequest, ChunkStream, StreamChunk};
use tokio::sync::mpsc;

/// The reply produced by [`NullChatClient`].
pub const NULL_RESPONSE: &str =
    "This is a placeholder response. Configure a model to enable real calls.";

#[derive(Debug, Clone)]
pub struct NullChatClient {
    model: String,
}

impl NullChatClient {
    pub fn new() -> Self {
        Self {
            model: "null".into(),
        }
    }
}

impl Default for NullChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for NullChatClient {
    fn name(&self) -> &str {
        "null"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_stream(
        &self,
        _request: ChatRequest,
    ) -> std::result::Result<ChunkStream, ProviderError> {
        let (tx, rx) = mpsc::channel(2);
        // Capacity covers both chunks, so neither send can fail or block.
        let _ = tx.try_send(Ok(StreamChunk::text(NULL_RESPONSE)));
        let _ = tx.try_send(Ok(StreamChunk::finish("stop")));
        Ok(rx)
    }
}
