//! OpenAI-compatible chat completions endpoint.

use crate::api::handlers::AppState;
use crate::api::models::ChatRequest;
use crate::core::error::{AppError, Result};
use crate::core::logging::{generate_chat_completion_id, generate_id, get_request_id};
use crate::core::metrics::record_token_usage;
use crate::core::tokenizer::count_tokens;
use crate::transformer::canonical::NormalizedDelta;
use crate::transformer::sse::{format_sse_data, format_sse_done, upstream_events};
use crate::transformer::tool_call::StreamRewriter;
use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    let chat_id = generate_id();
    let message_id = generate_id();
    let stream = request.stream();
    let include_usage = request.include_usage();
    tracing::debug!(
        "[{}] chat completion: stream={}, chat_id={}",
        get_request_id(),
        stream,
        chat_id
    );

    let user = state.users.get_user().await?;
    let canonical = state
        .normalizer
        .normalize(request, &user, &chat_id, &message_id)
        .await?;
    let model = canonical.model.clone();

    let prompt_tokens = if include_usage {
        count_tokens(&canonical.prompt_text())
    } else {
        0
    };

    let response = state.upstream.send_chat(&canonical, &user).await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        tracing::error!("upstream chat failed with status {}: {}", status, message);
        return Err(AppError::Upstream {
            status,
            message: "upstream API error".to_string(),
        });
    }

    if stream {
        return Ok(stream_response(
            state,
            response,
            model,
            prompt_tokens,
            include_usage,
        ));
    }

    aggregate_response(state, response, model, prompt_tokens, include_usage).await
}

/// Build one `chat.completion.chunk` frame.
fn chunk(model: &str, delta: Value, finish_reason: Value) -> Value {
    json!({
        "id": generate_chat_completion_id(),
        "object": "chat.completion.chunk",
        "created": chrono::Utc::now().timestamp_millis(),
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason
        }]
    })
}

fn stream_response(
    state: Arc<AppState>,
    response: reqwest::Response,
    model: String,
    prompt_tokens: usize,
    include_usage: bool,
) -> Response {
    let think_mode = state.config.think_mode;

    let body_stream = async_stream::stream! {
        let events = upstream_events(response);
        futures::pin_mut!(events);

        let mut rewriter = StreamRewriter::new(think_mode);
        let mut completion_text = String::new();
        let mut finish_reason = "stop";

        while let Some(event) = events.next().await {
            if event.done {
                break;
            }
            let delta = match rewriter.push(&event) {
                NormalizedDelta::Reasoning(text) => {
                    completion_text.push_str(&text);
                    json!({"role": "assistant", "reasoning_content": text})
                }
                NormalizedDelta::Answer(text) => {
                    completion_text.push_str(&text);
                    json!({"role": "assistant", "content": text})
                }
                NormalizedDelta::ToolInvocation(invocation) => {
                    finish_reason = "tool_calls";
                    json!({"role": "assistant", "tool_calls": [{
                        "index": 0,
                        "id": invocation.id,
                        "type": "function",
                        "function": {
                            "name": invocation.name,
                            "arguments": invocation.arguments_json()
                        }
                    }]})
                }
                _ => continue,
            };
            let frame = chunk(&model, delta, Value::Null);
            yield Ok::<_, Infallible>(Bytes::from(format_sse_data(&frame.to_string())));
        }

        let finish = chunk(&model, json!({"role": "assistant"}), json!(finish_reason));
        yield Ok(Bytes::from(format_sse_data(&finish.to_string())));

        if include_usage {
            let completion_tokens = count_tokens(&completion_text);
            record_token_usage(&model, prompt_tokens, completion_tokens);
            let usage = json!({
                "id": generate_chat_completion_id(),
                "object": "chat.completion.chunk",
                "created": chrono::Utc::now().timestamp_millis(),
                "model": model,
                "choices": [],
                "usage": {
                    "prompt_tokens": prompt_tokens,
                    "completion_tokens": completion_tokens,
                    "total_tokens": prompt_tokens + completion_tokens
                }
            });
            yield Ok(Bytes::from(format_sse_data(&usage.to_string())));
        }

        yield Ok(Bytes::from(format_sse_done()));
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .body(Body::from_stream(body_stream))
        .unwrap()
}

async fn aggregate_response(
    state: Arc<AppState>,
    response: reqwest::Response,
    model: String,
    prompt_tokens: usize,
    include_usage: bool,
) -> Result<Response> {
    let events = upstream_events(response);
    futures::pin_mut!(events);

    let mut rewriter = StreamRewriter::new(state.config.think_mode);
    let mut reasoning_text = String::new();
    let mut answer_text = String::new();
    let mut tool_invocation = None;

    while let Some(event) = events.next().await {
        if event.done {
            break;
        }
        match rewriter.push(&event) {
            NormalizedDelta::Reasoning(text) => reasoning_text.push_str(&text),
            NormalizedDelta::Answer(text) => answer_text.push_str(&text),
            NormalizedDelta::ToolInvocation(invocation) => tool_invocation = Some(invocation),
            _ => {}
        }
    }

    let mut message = json!({"role": "assistant"});
    let mut finish_reason = "stop";
    if !reasoning_text.is_empty() {
        message["reasoning_content"] = json!(reasoning_text);
    }
    if !answer_text.is_empty() {
        message["content"] = json!(answer_text);
    }
    if let Some(invocation) = &tool_invocation {
        finish_reason = "tool_calls";
        message["tool_calls"] = json!([{
            "index": 0,
            "id": invocation.id,
            "type": "function",
            "function": {
                "name": invocation.name,
                "arguments": invocation.arguments_json()
            }
        }]);
    }

    let mut result = json!({
        "id": generate_chat_completion_id(),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp_millis(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason
        }]
    });

    if include_usage {
        let completion_tokens = count_tokens(&format!("{}{}", reasoning_text, answer_text));
        record_token_usage(&model, prompt_tokens, completion_tokens);
        result["usage"] = json!({
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        });
    }

    Ok(Json(result).into_response())
}
