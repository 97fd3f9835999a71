//! Reassembly of streamed tool-call deltas.
//!
//! In a streamed response, tool calls arrive in pieces: the first delta for
//! an index carries the id, type, and function name; later deltas carry
//! argument fragments. Providers may interleave fragments for several calls
//! in one response, so the position index, not arrival order, decides
//! which call a fragment belongs to and the order calls are dispatched in.

use std::collections::BTreeMap;

use crate::message::{ToolCallRequest, default_call_kind};
use crate::provider::ToolCallDelta;

/// Accumulates [`ToolCallDelta`]s into complete [`ToolCallRequest`]s.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    builders: BTreeMap<u32, CallBuilder>,
    max_index: Option<u32>,
}

#[derive(Debug)]
struct CallBuilder {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

impl Default for CallBuilder {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: default_call_kind(),
            name: String::new(),
            arguments: String::new(),
        }
    }
}

impl CallBuilder {
    fn build(&self) -> ToolCallRequest {
        ToolCallRequest {
            id: self.id.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into the builder at its index.
    ///
    /// Identity fields are only written when the delta carries a non-empty
    /// value; argument fragments are appended, never replaced.
    pub fn accumulate(&mut self, delta: &ToolCallDelta) {
        let builder = self.builders.entry(delta.index).or_default();
        self.max_index = Some(self.max_index.map_or(delta.index, |m| m.max(delta.index)));

        if let Some(id) = non_empty(&delta.id) {
            builder.id = id.to_string();
        }
        if let Some(kind) = non_empty(&delta.kind) {
            builder.kind = kind.to_string();
        }
        if let Some(name) = non_empty(&delta.function_name) {
            builder.name = name.to_string();
        }
        if let Some(fragment) = &delta.arguments {
            builder.arguments.push_str(fragment);
        }
    }

    /// Emit one request per observed index, ascending. Gaps cost nothing:
    /// only populated indices are visited.
    pub fn build(&self) -> Vec<ToolCallRequest> {
        let Some(max) = self.max_index else {
            return Vec::new();
        };
        self.builders
            .range(..=max)
            .map(|(_, builder)| builder.build())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Number of distinct indices seen so far.
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn clear(&mut self) {
        self.builders.clear();
        self.max_index = None;
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(index: u32, id: &str, name: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: Some(id.into()),
            kind: Some("function".into()),
            function_name: Some(name.into()),
            arguments: Some(String::new()),
        }
    }

    fn fragment(index: u32, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            arguments: Some(args.into()),
            ..Default::default()
        }
    }

    #[test]
    fn empty_accumulator_builds_nothing() {
        let acc = ToolCallAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.build().is_empty());
    }

    #[test]
    fn fragments_concatenate_in_receipt_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.accumulate(&fragment(0, "a"));
        acc.accumulate(&fragment(0, "b"));
        acc.accumulate(&fragment(0, "c"));

        let calls = acc.build();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, "abc");
    }

    #[test]
    fn identity_fields_come_from_first_delta() {
        let mut acc = ToolCallAccumulator::new();
        acc.accumulate(&first(0, "call_123", "calculator"));
        acc.accumulate(&fragment(0, "{\"expr\""));
        acc.accumulate(&fragment(0, ": \"2+2\"}"));

        let calls = acc.build();
        assert_eq!(calls[0].id, "call_123");
        assert_eq!(calls[0].name, "calculator");
        assert_eq!(calls[0].kind, "function");
        assert_eq!(calls[0].arguments, "{\"expr\": \"2+2\"}");
    }

    #[test]
    fn empty_identity_values_do_not_overwrite() {
        let mut acc = ToolCallAccumulator::new();
        acc.accumulate(&first(0, "call_1", "search"));
        acc.accumulate(&ToolCallDelta {
            index: 0,
            id: Some(String::new()),
            function_name: Some(String::new()),
            arguments: Some("{}".into()),
            ..Default::default()
        });

        let calls = acc.build();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "search");
    }

    #[test]
    fn sparse_indices_are_skipped() {
        let mut acc = ToolCallAccumulator::new();
        acc.accumulate(&first(2, "call_c", "third"));
        acc.accumulate(&first(0, "call_a", "first"));

        let calls = acc.build();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[1].id, "call_c");
    }

    #[test]
    fn interleaved_fragments_stay_with_their_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.accumulate(&first(0, "call_a", "search"));
        acc.accumulate(&first(1, "call_b", "calc"));
        acc.accumulate(&fragment(1, "{\"x\":"));
        acc.accumulate(&fragment(0, "{\"q\":"));
        acc.accumulate(&fragment(0, "\"rust\"}"));
        acc.accumulate(&fragment(1, "1}"));

        let calls = acc.build();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, r#"{"q":"rust"}"#);
        assert_eq!(calls[1].arguments, r#"{"x":1}"#);
    }

    #[test]
    fn clear_resets_state() {
        let mut acc = ToolCallAccumulator::new();
        acc.accumulate(&first(3, "c", "n"));
        assert_eq!(acc.len(), 1);
        acc.clear();
        assert!(acc.is_empty());
        assert!(acc.build().is_empty());
    }

    #[test]
    fn huge_index_builds_without_scanning_the_gap() {
        let mut acc = ToolCallAccumulator::new();
        acc.accumulate(&first(2_000_000_000, "far", "lookup"));
        acc.accumulate(&first(0, "near", "lookup"));
        acc.accumulate(&first(u32::MAX, "edge", "lookup"));

        let started = std::time::Instant::now();
        let calls = acc.build();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        let ids: Vec<_> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far", "edge"]);
    }
}
