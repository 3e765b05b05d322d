//! zai-proxy - OpenAI/Anthropic compatible gateway for the Z.ai chat API
//!
//! This library implements a protocol-translation gateway: requests arrive
//! in either the OpenAI chat-completions or Anthropic messages schema, are
//! normalized into the upstream's own (undocumented) request shape, signed
//! with a time-windowed HMAC, and forwarded. The upstream's phase-tagged
//! SSE stream is rewritten back into the caller's format on the way out.
//!
//! # Architecture
//!
//! - [`core`]: configuration, errors, logging, metrics, token counting
//! - [`services`]: request signing and the upstream HTTP client with its
//!   cached user/model metadata
//! - [`transformer`]: the streaming translation engine (request
//!   normalization, SSE consumption, phase rewriting, tool-call
//!   reconstruction)
//! - [`api`]: HTTP handlers and wire assembly for both public schemas
//!
//! # Configuration
//!
//! Environment variables (a `.env` file is honored):
//! - `UPSTREAM_BASE_URL`: upstream base URL (default: https://chat.z.ai)
//! - `TOKEN`: upstream account token; empty enables anonymous visitor mode
//! - `PORT`: listen port (default: 8080)
//! - `MODEL`: default model id (default: glm-4.6)
//! - `THINK_TAGS_MODE`: one of `reasoning`, `think`, `strip`, `details`
//! - `DEBUG`: verbose request logging

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{build_router, AppState, ChatRequest};
pub use core::{AppConfig, AppError, Result, ThinkMode};
pub use services::{ModelCatalog, UpstreamClient, UserService};
pub use transformer::{
    CanonicalRequest, NormalizedDelta, Normalizer, PhaseRewriter, StreamRewriter, UpstreamEvent,
};
