//! The streaming translation engine.
//!
//! Inbound requests in either public schema normalize into one canonical
//! shape; the upstream's phase-tagged SSE output flows back through a
//! per-stream rewrite pipeline:
//!
//! ```text
//! ChatRequest ──[normalize]──> CanonicalRequest ──> upstream
//!
//! upstream bytes ──[sse]──> UpstreamEvent
//!     ──[phase]──> NormalizedDelta / ToolCallFragment
//!         ──[tool_call]──> ToolInvocation
//! ```
//!
//! Every piece of per-stream state (the rewriter's previous phase, the
//! tool-call buffer) is created at stream start and dropped at stream
//! end; nothing is shared between concurrent requests.

pub mod canonical;
pub mod normalize;
pub mod phase;
pub mod sse;
pub mod tool_call;

// Re-export commonly used types
pub use canonical::{
    CanonicalMessage, CanonicalRequest, ContentBlock, ContentValue, ImageRef, NormalizedDelta,
    Phase, Role, ToolCallRecord, ToolInvocation, ToolSpec, UpstreamEvent,
};
pub use normalize::Normalizer;
pub use phase::PhaseRewriter;
pub use sse::{events_from_bytes, format_sse_data, format_sse_done, format_sse_event, upstream_events};
pub use tool_call::{StreamRewriter, ToolCallReconstructor};
