//! Context compaction: shrinking history when the token estimate runs high.

use stepwire_config::CompactionConfig;
use stepwire_core::context::Context;
use stepwire_core::message::{Message, Role};
use tracing::debug;

/// A policy that reduces a [`Context`] in place.
///
/// Compaction is lossy. Implementations must never raise the token estimate.
pub trait Compaction: Send + Sync {
    fn compact(&self, context: &mut Context);
}

/// Keep the most recent messages and drop the rest.
#[derive(Debug, Clone)]
pub struct SimpleCompaction {
    keep_recent: usize,
    tokens_per_message: u32,
}

impl SimpleCompaction {
    pub fn new(keep_recent: usize, tokens_per_message: u32) -> Self {
        Self {
            keep_recent: keep_recent.max(1),
            tokens_per_message,
        }
    }

    pub fn from_config(config: &CompactionConfig) -> Self {
        Self::new(config.keep_recent, config.tokens_per_message)
    }
}

impl Default for SimpleCompaction {
    fn default() -> Self {
        Self::from_config(&CompactionConfig::default())
    }
}

impl Compaction for SimpleCompaction {
    fn compact(&self, context: &mut Context) {
        let history = context.history();
        if history.len() <= self.keep_recent {
            return;
        }

        let start = history.len() - self.keep_recent;
        let mut kept: Vec<Message> = history[start..].to_vec();

        // Tool results whose request was cut off cannot be sent alone.
        let orphans = kept.iter().take_while(|m| m.role == Role::Tool).count();
        kept.drain(..orphans);

        let last_user = history.iter().rposition(|m| m.role == Role::User);
        if let Some(pos) = last_user.filter(|&pos| pos < start) {
            kept.insert(0, history[pos].clone());
        }

        let before_len = history.len();
        let before_tokens = context.token_count();
        let kept_len = u32::try_from(kept.len()).unwrap_or(u32::MAX);
        let estimate = kept_len
            .saturating_mul(self.tokens_per_message)
            .min(before_tokens);

        debug!(
            before = before_len,
            after = kept.len(),
            tokens_before = before_tokens,
            tokens_after = estimate,
            "Compacted context"
        );

        context.replace_history(kept);
        context.set_token_count(estimate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwire_core::message::ToolCallRequest;

    fn ids(ctx: &Context) -> Vec<String> {
        ctx.history().iter().map(|m| m.id.clone()).collect()
    }

    fn long_context(turns: usize) -> Context {
        let mut ctx = Context::new();
        for i in 0..turns {
            ctx.append(Message::user(format!("question {i}")));
            ctx.append(Message::assistant(format!("answer {i}")));
        }
        ctx.set_token_count(5000);
        ctx
    }

    #[test]
    fn short_history_is_untouched() {
        let mut ctx = long_context(3);
        let before = ids(&ctx);
        SimpleCompaction::default().compact(&mut ctx);
        assert_eq!(ids(&ctx), before);
        assert_eq!(ctx.token_count(), 5000);
    }

    #[test]
    fn keeps_most_recent_and_lowers_estimate() {
        let mut ctx = long_context(20);
        let tail: Vec<String> = ids(&ctx)[30..].to_vec();

        SimpleCompaction::default().compact(&mut ctx);
        assert_eq!(ctx.len(), 10);
        assert_eq!(ids(&ctx), tail);
        assert_eq!(ctx.token_count(), 1000);
    }

    #[test]
    fn never_increases_estimate() {
        let mut ctx = long_context(20);
        ctx.set_token_count(50);
        SimpleCompaction::default().compact(&mut ctx);
        assert_eq!(ctx.token_count(), 50);
    }

    #[test]
    fn is_idempotent() {
        let mut ctx = Context::new();
        ctx.append(Message::user("the only question"));
        for i in 0..15 {
            ctx.append(Message::assistant_with_tools(
                "",
                vec![ToolCallRequest::new(format!("c{i}"), "lookup", "{}")],
            ));
            ctx.append(Message::tool_result(format!("c{i}"), "ok"));
        }
        ctx.set_token_count(7000);

        let policy = SimpleCompaction::default();
        policy.compact(&mut ctx);
        let once = ids(&ctx);
        let once_tokens = ctx.token_count();

        policy.compact(&mut ctx);
        assert_eq!(ids(&ctx), once);
        assert_eq!(ctx.token_count(), once_tokens);
    }

    #[test]
    fn retains_user_message_outside_window() {
        let mut ctx = Context::new();
        ctx.append(Message::user("find me shoes"));
        let user_id = ctx.history()[0].id.clone();
        for i in 0..8 {
            ctx.append(Message::assistant_with_tools(
                "",
                vec![ToolCallRequest::new(format!("c{i}"), "search", "{}")],
            ));
            ctx.append(Message::tool_result(format!("c{i}"), "result"));
        }

        SimpleCompaction::new(4, 100).compact(&mut ctx);
        let history = ctx.history();
        assert_eq!(history[0].id, user_id);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn drops_leading_orphan_tool_results() {
        let mut ctx = Context::new();
        ctx.append(Message::user("go"));
        ctx.append(Message::assistant_with_tools(
            "",
            vec![
                ToolCallRequest::new("a", "t", "{}"),
                ToolCallRequest::new("b", "t", "{}"),
            ],
        ));
        ctx.append(Message::tool_result("a", "1"));
        ctx.append(Message::tool_result("b", "2"));
        ctx.append(Message::assistant("done"));

        SimpleCompaction::new(2, 100).compact(&mut ctx);
        let roles: Vec<Role> = ctx.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(ctx.history()[1].text(), "done");
    }

    #[test]
    fn checkpoints_survive_compaction() {
        let mut ctx = long_context(10);
        ctx.checkpoint(true);
        SimpleCompaction::new(2, 10).compact(&mut ctx);
        assert_eq!(ctx.checkpoint_count(), 1);
    }
}
