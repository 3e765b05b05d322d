//! API layer: HTTP handlers, inbound wire types, and router assembly.

pub mod chat;
pub mod handlers;
pub mod messages;
pub mod models;

// Re-export commonly used types
pub use chat::chat_completions;
pub use handlers::{build_router, health, list_models, metrics_handler, AppState};
pub use messages::anthropic_messages;
pub use models::{ChatRequest, InboundBlock, InboundContent, InboundMessage, SystemPrompt};
