//! Chat client implementations for stepwire.
//!
//! All clients implement the `stepwire_core::ChatClient` trait.
//! [`build_from_config`] picks and constructs one from an `EngineConfig`;
//! [`ClientCache`] keeps a bounded set of them alive.

pub mod cache;
pub mod factory;
pub mod null;
pub mod openai_compat;
pub mod sse;

pub use cache::ClientCache;
pub use factory::build_from_config;
pub use null::{NULL_RESPONSE, NullChatClient};
pub use openai_compat::OpenAiCompatClient;
