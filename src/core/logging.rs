//! Logging utilities and ID generation.
//!
//! Every inbound request gets a UUID-based request ID stored in a
//! task-local so log lines for one request can be correlated without
//! threading the ID through every call.

use axum::{extract::Request, middleware::Next, response::Response};

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a bare UUID v4, used for upstream chat/message/request IDs.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    generate_id()
}

/// Generate an OpenAI-style completion ID.
pub fn generate_chat_completion_id() -> String {
    format!("chatcmpl-{}", generate_id())
}

/// Generate an Anthropic-style message ID.
pub fn generate_message_id() -> String {
    format!("msg-{}", generate_id())
}

/// Middleware that scopes a fresh request ID around each request.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    REQUEST_ID
        .scope(generate_request_id(), next.run(request))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_id_get() {
        REQUEST_ID
            .scope("test-request-123".to_string(), async {
                assert_eq!(get_request_id(), "test-request-123");
            })
            .await;
    }

    #[tokio::test]
    async fn test_request_id_default() {
        assert_eq!(get_request_id(), "");
    }

    #[tokio::test]
    async fn test_request_id_isolation() {
        let task1 = tokio::spawn(async {
            REQUEST_ID
                .scope("request-1".to_string(), async {
                    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                    get_request_id()
                })
                .await
        });

        let task2 = tokio::spawn(async {
            REQUEST_ID
                .scope("request-2".to_string(), async {
                    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                    get_request_id()
                })
                .await
        });

        assert_eq!(task1.await.unwrap(), "request-1");
        assert_eq!(task2.await.unwrap(), "request-2");
    }

    #[test]
    fn test_generate_request_id_is_unique_uuid() {
        let id1 = generate_request_id();
        let id2 = generate_request_id();

        assert_eq!(id1.len(), 36);
        assert_ne!(id1, id2);

        let parts: Vec<&str> = id1.split('-').collect();
        assert_eq!(parts.len(), 5);
    }

    #[test]
    fn test_prefixed_ids() {
        assert!(generate_chat_completion_id().starts_with("chatcmpl-"));
        assert!(generate_message_id().starts_with("msg-"));
    }
}
