//! The agent runtime: step loop, compaction, and engine.
//!
//! A run follows a **stream → record → dispatch** cycle:
//!
//! 1. **Receive** a user input and append it to the context
//! 2. **Stream** a response from the chat client (system prompt + history + tool schemas)
//! 3. **Record** the assembled assistant message and its token estimate
//! 4. **If tool calls**: execute them in order, append results, loop back to step 2
//! 5. **If text only**: the run is done
//!
//! Every step is bounded by `max_steps_per_run`, and the context is
//! compacted before a step whenever its estimate nears the budget.
//! Progress is published on the [`Wire`](stepwire_core::Wire).

pub mod compaction;
pub mod engine;
pub mod executor;
pub mod factory;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use compaction::{Compaction, SimpleCompaction};
pub use engine::{Engine, EngineBuilder, RunHandle};
pub use executor::{AgentExecutor, ExecutorLimits, ExecutorState, RunOutcome};
pub use factory::EngineFactory;
pub use token::estimate_tokens;
