//! The conversation buffer a run reads from and appends to.

use crate::message::Message;

/// Ordered, append-only history plus a running token estimate.
///
/// The estimate is heuristic; callers add to it as messages are appended and
/// compaction may lower it. Checkpoints are only counted; nothing is
/// restored from them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    history: Vec<Message>,
    token_count: u32,
    checkpoints: u32,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn token_count(&self) -> u32 {
        self.token_count
    }

    pub fn set_token_count(&mut self, count: u32) {
        self.token_count = count;
    }

    pub fn add_tokens(&mut self, count: u32) {
        self.token_count = self.token_count.saturating_add(count);
    }

    /// Record a checkpoint. `is_step` distinguishes the per-step checkpoint
    /// from the one taken at the start of a run.
    pub fn checkpoint(&mut self, is_step: bool) {
        self.checkpoints = self.checkpoints.saturating_add(1);
        tracing::trace!(checkpoint = self.checkpoints, is_step, "Context checkpoint");
    }

    pub fn checkpoint_count(&self) -> u32 {
        self.checkpoints
    }

    /// Swap in a new history, keeping the checkpoint counter.
    pub fn replace_history(&mut self, history: Vec<Message>) {
        self.history = history;
    }

    /// Wipe history and reset both counters.
    pub fn clear(&mut self) {
        self.history.clear();
        self.token_count = 0;
        self.checkpoints = 0;
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
