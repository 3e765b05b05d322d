//! Anthropic-compatible messages endpoint.
//!
//! The streaming path synthesizes the full Anthropic event sequence
//! (`message_start`, `content_block_start`, `ping`, deltas, block stops,
//! `message_delta`, `message_stop`) around the normalized delta stream. A
//! reconstructed tool call closes the text block and re-streams its input
//! as `input_json_delta` frames in 5-byte chunks.

use crate::api::handlers::AppState;
use crate::api::models::ChatRequest;
use crate::core::error::{AppError, Result};
use crate::core::logging::{generate_id, generate_message_id, get_request_id};
use crate::core::metrics::record_token_usage;
use crate::core::tokenizer::count_tokens;
use crate::transformer::canonical::{NormalizedDelta, ToolInvocation};
use crate::transformer::sse::{format_sse_event, upstream_events};
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

const INPUT_JSON_CHUNK_BYTES: usize = 5;

pub async fn anthropic_messages(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    let chat_id = generate_id();
    let message_id = generate_id();
    let stream = request.stream();
    tracing::debug!(
        "[{}] anthropic message: stream={}, chat_id={}",
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
    let prompt_tokens = count_tokens(&canonical.prompt_text());

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
        return Ok(stream_response(state, response, model, prompt_tokens));
    }

    aggregate_response(state, response, model, prompt_tokens).await
}

fn event_frame(name: &str, payload: &Value) -> Bytes {
    Bytes::from(format_sse_event(name, &payload.to_string()))
}

/// The frames that stream one reconstructed tool call: close the text
/// block, open a `tool_use` block, re-stream the input JSON in small
/// `input_json_delta` chunks, close the block.
fn tool_use_frames(invocation: &ToolInvocation) -> Vec<Bytes> {
    let mut frames = Vec::new();

    frames.push(event_frame(
        "content_block_stop",
        &json!({"type": "content_block_stop", "index": 0}),
    ));
    frames.push(event_frame(
        "content_block_start",
        &json!({
            "type": "content_block_start",
            "index": 1,
            "content_block": {
                "type": "tool_use",
                "id": invocation.id,
                "name": invocation.name,
                "input": Value::Null
            }
        }),
    ));

    if invocation.arguments.is_object() {
        let input_json = invocation.arguments_json();
        for piece in input_json.as_bytes().chunks(INPUT_JSON_CHUNK_BYTES) {
            frames.push(event_frame(
                "content_block_delta",
                &json!({
                    "type": "content_block_delta",
                    "index": 1,
                    "delta": {
                        "type": "input_json_delta",
                        "partial_json": String::from_utf8_lossy(piece)
                    }
                }),
            ));
        }
    }

    frames.push(event_frame(
        "content_block_stop",
        &json!({"type": "content_block_stop", "index": 1}),
    ));
    frames
}

fn stream_response(
    state: Arc<AppState>,
    response: reqwest::Response,
    model: String,
    prompt_tokens: usize,
) -> Response {
    let think_mode = state.config.think_mode;

    let body_stream = async_stream::stream! {
        yield Ok::<_, Infallible>(event_frame(
            "message_start",
            &json!({
                "type": "message_start",
                "message": {
                    "id": generate_message_id(),
                    "type": "message",
                    "role": "assistant",
                    "model": model,
                    "stop_reason": Value::Null,
                    "stop_sequence": Value::Null,
                    "usage": {"input_tokens": prompt_tokens, "output_tokens": 0}
                }
            }),
        ));
        yield Ok(event_frame(
            "content_block_start",
            &json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": {"type": "text", "text": ""}
            }),
        ));
        yield Ok(event_frame("ping", &json!({"type": "ping"})));

        let events = upstream_events(response);
        futures::pin_mut!(events);

        let mut rewriter = StreamRewriter::new(think_mode);
        let mut completion_text = String::new();
        let mut has_tool_call = false;

        while let Some(event) = events.next().await {
            if event.done {
                break;
            }
            match rewriter.push(&event) {
                NormalizedDelta::Reasoning(text) => {
                    completion_text.push_str(&text);
                    yield Ok(event_frame(
                        "content_block_delta",
                        &json!({
                            "type": "content_block_delta",
                            "index": 0,
                            "delta": {"type": "thinking_delta", "thinking": text}
                        }),
                    ));
                }
                NormalizedDelta::Answer(text) => {
                    completion_text.push_str(&text);
                    yield Ok(event_frame(
                        "content_block_delta",
                        &json!({
                            "type": "content_block_delta",
                            "index": 0,
                            "delta": {"type": "text_delta", "text": text}
                        }),
                    ));
                }
                NormalizedDelta::ToolInvocation(invocation) => {
                    has_tool_call = true;
                    for frame in tool_use_frames(&invocation) {
                        yield Ok(frame);
                    }
                    break;
                }
                _ => {}
            }
        }

        if !has_tool_call {
            yield Ok(event_frame(
                "content_block_stop",
                &json!({"type": "content_block_stop", "index": 0}),
            ));
        }

        let completion_tokens = count_tokens(&completion_text);
        record_token_usage(&model, prompt_tokens, completion_tokens);

        yield Ok(event_frame(
            "message_delta",
            &json!({
                "type": "message_delta",
                "delta": {
                    "stop_reason": if has_tool_call { "tool_use" } else { "end_turn" },
                    "stop_sequence": Value::Null
                },
                "usage": {"output_tokens": completion_tokens}
            }),
        ));
        yield Ok(event_frame("message_stop", &json!({"type": "message_stop"})));
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
) -> Result<Response> {
    let events = upstream_events(response);
    futures::pin_mut!(events);

    let mut rewriter = StreamRewriter::new(state.config.think_mode);
    let mut text = String::new();
    let mut tool_invocation = None;

    while let Some(event) = events.next().await {
        if event.done {
            break;
        }
        match rewriter.push(&event) {
            // reasoning and answer text both fold into the text block
            NormalizedDelta::Reasoning(fragment) | NormalizedDelta::Answer(fragment) => {
                text.push_str(&fragment)
            }
            NormalizedDelta::ToolInvocation(invocation) => {
                tool_invocation = Some(invocation);
                break;
            }
            _ => {}
        }
    }

    let completion_tokens = count_tokens(&text);
    record_token_usage(&model, prompt_tokens, completion_tokens);

    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(json!({"type": "text", "text": text}));
    }
    let stop_reason = match &tool_invocation {
        Some(invocation) => {
            content.push(json!({
                "type": "tool_use",
                "id": invocation.id,
                "name": invocation.name,
                "input": invocation.arguments
            }));
            "tool_use"
        }
        None => "end_turn",
    };

    Ok(Json(json!({
        "id": generate_message_id(),
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "usage": {
            "input_tokens": prompt_tokens,
            "output_tokens": completion_tokens
        },
        "stop_sequence": Value::Null,
        "stop_reason": stop_reason
    }))
    .into_response())
}
