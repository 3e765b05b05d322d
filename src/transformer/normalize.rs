//! Request normalization.
//!
//! Converts an inbound request (either public schema) into a
//! [`CanonicalRequest`]. Normalization is deliberately forgiving: missing
//! or malformed optional fields are absent, unresolvable models pass
//! through unchanged, and a failed image upload degrades to a visible
//! inline error instead of rejecting the request. Message content only
//! ever grows.

use crate::api::models::{ChatRequest, InboundBlock, InboundContent, InboundMessage, SystemPrompt};
use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::services::catalog::ModelCatalog;
use crate::services::upstream::UpstreamClient;
use crate::services::user::UserInfo;
use crate::transformer::canonical::{
    CanonicalMessage, CanonicalRequest, ContentBlock, ContentValue, ImageRef, Role,
    ToolCallRecord,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Normalizer {
    config: Arc<AppConfig>,
    catalog: Arc<ModelCatalog>,
    upstream: Arc<UpstreamClient>,
}

impl Normalizer {
    pub fn new(
        config: Arc<AppConfig>,
        catalog: Arc<ModelCatalog>,
        upstream: Arc<UpstreamClient>,
    ) -> Self {
        Self {
            config,
            catalog,
            upstream,
        }
    }

    /// Normalize an inbound request into the canonical upstream shape.
    pub async fn normalize(
        &self,
        inbound: ChatRequest,
        user: &UserInfo,
        chat_id: &str,
        message_id: &str,
    ) -> Result<CanonicalRequest> {
        let requested_model = inbound
            .model
            .clone()
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());

        let mut messages = Vec::new();

        if let Some(system) = &inbound.system {
            let content = fold_system_prompt(system);
            if !content.is_empty() {
                messages.push(CanonicalMessage::text(Role::System, content));
            }
        }

        for message in &inbound.messages {
            match &message.content {
                Some(InboundContent::Text(text)) => {
                    messages.push(CanonicalMessage {
                        role: message.role,
                        content: ContentValue::Text(text.clone()),
                        tool_calls: message.tool_calls.clone(),
                        tool_call_id: message.tool_call_id.clone(),
                    });
                }
                Some(InboundContent::Blocks(blocks)) => {
                    self.flatten_blocks(message, blocks, chat_id, user, &mut messages)
                        .await;
                }
                // assistant tool-call messages legitimately arrive with null content
                None => {
                    messages.push(CanonicalMessage {
                        role: message.role,
                        content: ContentValue::Text(String::new()),
                        tool_calls: message.tool_calls.clone(),
                        tool_call_id: message.tool_call_id.clone(),
                    });
                }
            }
        }

        // display id -> upstream internal id; unknown ids pass through
        let model = self
            .catalog
            .resolve_internal(&requested_model, user)
            .await
            .unwrap_or(requested_model);

        let features = self.negotiate_features(&inbound, &model, user).await;

        Ok(CanonicalRequest {
            model,
            messages,
            stream: true,
            chat_id: chat_id.to_string(),
            id: message_id.to_string(),
            features,
            tools: inbound.tools.clone(),
            temperature: inbound.temperature,
            top_p: inbound.top_p,
            max_tokens: inbound.max_tokens,
            frequency_penalty: inbound.frequency_penalty,
            presence_penalty: inbound.presence_penalty,
        })
    }

    /// Flatten a block list into canonical content. Tool-use blocks turn
    /// into tool-call records on the message; tool-result blocks become
    /// separate tool-role messages. A message that carried only tool
    /// results is not itself forwarded.
    async fn flatten_blocks(
        &self,
        message: &InboundMessage,
        blocks: &[InboundBlock],
        chat_id: &str,
        user: &UserInfo,
        out: &mut Vec<CanonicalMessage>,
    ) {
        let mut content = ContentValue::default();
        let mut tool_calls: Vec<ToolCallRecord> = message.tool_calls.clone().unwrap_or_default();
        let mut saw_tool_result = false;

        for block in blocks {
            match block {
                InboundBlock::Text { text } => content.push_text(text),
                InboundBlock::ImageUrl { image_url } => {
                    let url = image_url
                        .as_ref()
                        .map(|image| image.url.clone())
                        .unwrap_or_default();
                    self.attach_image(&mut content, url, chat_id, user).await;
                }
                InboundBlock::Image { source } => {
                    let url = source
                        .as_ref()
                        .and_then(|source| source.to_data_url())
                        .unwrap_or_default();
                    self.attach_image(&mut content, url, chat_id, user).await;
                }
                InboundBlock::ToolUse { id, name, input } if message.role == Role::Assistant => {
                    let arguments = if input.is_object() {
                        serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string())
                    } else {
                        "{}".to_string()
                    };
                    tool_calls.push(ToolCallRecord::function(id.clone(), name.clone(), arguments));
                }
                InboundBlock::ToolUse { .. } => {}
                InboundBlock::ToolResult {
                    tool_use_id,
                    content: result,
                } => {
                    saw_tool_result = true;
                    out.push(CanonicalMessage::tool_result(
                        tool_use_id.clone(),
                        tool_result_text(result),
                    ));
                }
                InboundBlock::Unknown => {}
            }
        }

        let has_tool_calls = !tool_calls.is_empty();
        if has_tool_calls || !saw_tool_result {
            out.push(CanonicalMessage {
                role: message.role,
                content,
                tool_calls: has_tool_calls.then_some(tool_calls),
                tool_call_id: message.tool_call_id.clone(),
            });
        }
    }

    /// Resolve an image reference, uploading base64 data when the
    /// upstream is authenticated. Failures append an inline error text
    /// block; the request always proceeds.
    async fn attach_image(
        &self,
        content: &mut ContentValue,
        url: String,
        chat_id: &str,
        user: &UserInfo,
    ) {
        if url.is_empty() {
            content.push_block(ContentBlock::Text {
                text: "system: image error - Unsupported format or missing URL".to_string(),
            });
            return;
        }

        match self.upstream.upload_image(&url, chat_id, user).await {
            Ok(Some(uploaded)) => content.push_block(ContentBlock::ImageUrl {
                image_url: ImageRef { url: uploaded },
            }),
            Ok(None) => content.push_block(ContentBlock::ImageUrl {
                image_url: ImageRef { url },
            }),
            Err(e) => {
                tracing::warn!("image upload failed: {}", e);
                content.push_block(ContentBlock::Text {
                    text: format!("system: image upload error - {}", e),
                });
            }
        }
    }

    /// Normalize the three thinking-request shapes into one boolean; when
    /// the resolved model explicitly marks thinking unsupported the flag
    /// is dropped entirely rather than forced false.
    async fn negotiate_features(
        &self,
        inbound: &ChatRequest,
        model: &str,
        user: &UserInfo,
    ) -> Option<BTreeMap<String, Value>> {
        let mut features: BTreeMap<String, Value> = BTreeMap::new();
        features.insert("enable_thinking".to_string(), Value::Bool(false));

        if let Some(extra) = &inbound.features {
            for (key, value) in extra {
                features.insert(key.clone(), value.clone());
            }
        }
        if let Some(enabled) = inbound.enable_thinking {
            features.insert("enable_thinking".to_string(), Value::Bool(enabled));
        }
        if let Some(toggle) = &inbound.thinking {
            features.insert("enable_thinking".to_string(), Value::Bool(toggle.enabled()));
        }

        if self.catalog.thinking_supported(model, user).await == Some(false) {
            features.remove("enable_thinking");
        }

        (!features.is_empty()).then_some(features)
    }
}

fn fold_system_prompt(system: &SystemPrompt) -> String {
    match system {
        SystemPrompt::Text(text) => text.trim_start_matches('\n').to_string(),
        SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.trim_start_matches('\n'))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn tool_result_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect(),
        _ => String::new(),
    }
}
