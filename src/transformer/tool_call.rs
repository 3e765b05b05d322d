//! Tool-call reconstruction from streamed fragments.
//!
//! The upstream streams tool-call JSON in arbitrary splits, so the
//! accumulated text is reparsed after every fragment; failure is the
//! expected steady state until the final fragment lands. The buffer is
//! owned by exactly one stream and allocated fresh per stream.

use crate::core::config::ThinkMode;
use crate::transformer::canonical::{NormalizedDelta, ToolInvocation, UpstreamEvent};
use crate::transformer::phase::PhaseRewriter;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct RawToolCall {
    id: String,
    name: String,
    /// the tool arguments arrive as a JSON-encoded string
    arguments: String,
}

/// Accumulates fragments until they parse as a complete tool call, then
/// emits the invocation exactly once.
#[derive(Debug, Default)]
pub struct ToolCallReconstructor {
    buffer: String,
    emitted: bool,
}

impl ToolCallReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and try to complete the call.
    pub fn push(&mut self, fragment: &str) -> Option<ToolInvocation> {
        if self.emitted {
            return None;
        }
        self.buffer.push_str(fragment);

        let raw: RawToolCall = serde_json::from_str(&self.buffer).ok()?;
        let arguments = serde_json::from_str::<Map<String, Value>>(&raw.arguments)
            .map(Value::Object)
            .unwrap_or(Value::Null);

        self.emitted = true;
        Some(ToolInvocation {
            id: raw.id,
            name: raw.name,
            arguments,
        })
    }
}

/// The full per-stream rewrite pipeline: phase rewriting with tool-call
/// fragments routed into the reconstructor. Handlers consume this as a
/// single `push(event) -> delta` step.
pub struct StreamRewriter {
    rewriter: PhaseRewriter,
    reconstructor: ToolCallReconstructor,
}

impl StreamRewriter {
    pub fn new(mode: ThinkMode) -> Self {
        Self {
            rewriter: PhaseRewriter::new(mode),
            reconstructor: ToolCallReconstructor::new(),
        }
    }

    pub fn push(&mut self, event: &UpstreamEvent) -> NormalizedDelta {
        match self.rewriter.rewrite(event) {
            NormalizedDelta::ToolCallFragment(fragment) => {
                match self.reconstructor.push(&fragment) {
                    Some(invocation) => NormalizedDelta::ToolInvocation(invocation),
                    None => NormalizedDelta::Empty,
                }
            }
            delta => delta,
        }
    }
}
