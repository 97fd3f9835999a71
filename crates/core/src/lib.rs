//! # stepwire core
//!
//! Domain types, traits, and error definitions for the stepwire agent runtime.
//! This crate carries no transport or execution logic of its own. It defines
//! the model that the provider and agent crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: conversation messages and tool-call requests
//! - [`provider`]: the streaming [`ChatClient`] boundary and its chunk types
//! - [`accumulator`]: reassembly of streamed tool-call deltas
//! - [`tool`]: the [`Tool`] trait and the isolating [`ToolRegistry`]
//! - [`context`]: the append-only conversation buffer
//! - [`wire`]: the execution-lifecycle event bus
//! - [`agent`]: immutable agent identity

pub mod accumulator;
pub mod agent;
pub mod context;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod wire;

// Re-export key types at crate root for ergonomics
pub use accumulator::ToolCallAccumulator;
pub use agent::{Agent, AgentBuilder};
pub use context::Context;
pub use error::{EngineError, Error, ProviderError, Result, ToolError};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{
    ChatClient, ChatRequest, ChunkStream, StreamChunk, ToolCallDelta, ToolDefinition, Usage,
};
pub use tool::{Tool, ToolRegistry, ToolResult};
pub use wire::{ContentKind, DeliveryMode, Wire, WireListener, WireMessage};
