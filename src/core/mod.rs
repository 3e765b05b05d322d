//! Core functionality for the gateway.
//!
//! This module contains fundamental components used throughout the
//! application:
//! - Configuration management
//! - Error handling
//! - Request-scoped logging and ID generation
//! - Metrics collection
//! - Token counting

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod tokenizer;

// Re-export commonly used types
pub use config::{AppConfig, ThinkMode};
pub use error::{AppError, Result};
pub use logging::{
    generate_chat_completion_id, generate_id, generate_message_id, generate_request_id,
    get_request_id, request_id_middleware, REQUEST_ID,
};
pub use metrics::{get_metrics, init_metrics, record_token_usage, track_metrics, Metrics};
pub use tokenizer::count_tokens;
