//! Canonical request and stream types.
//!
//! Both public wire formats (OpenAI chat completions and Anthropic
//! messages) normalize into [`CanonicalRequest`], which serializes
//! directly to the upstream chat body. Upstream stream events and the
//! rewriter's output are modeled as closed tagged unions so every
//! consumer pattern-matches instead of probing JSON shapes at runtime.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => f.write_str("system"),
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
            Role::Tool => f.write_str("tool"),
        }
    }
}

/// Message content: either plain text or an ordered block list, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentValue {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ContentValue {
    /// Append text, either to the plain string or as a trailing text block.
    pub fn push_text(&mut self, text: &str) {
        match self {
            ContentValue::Text(existing) => existing.push_str(text),
            ContentValue::Blocks(blocks) => blocks.push(ContentBlock::Text {
                text: text.to_string(),
            }),
        }
    }

    /// Append a block, promoting plain text to a block list first.
    /// Content only ever grows; degraded blocks replace nothing.
    pub fn push_block(&mut self, block: ContentBlock) {
        if let ContentValue::Text(existing) = self {
            let mut blocks = vec![ContentBlock::Text {
                text: std::mem::take(existing),
            }];
            blocks.push(block);
            *self = ContentValue::Blocks(blocks);
        } else if let ContentValue::Blocks(blocks) = self {
            blocks.push(block);
        }
    }

    /// All text carried by this content, joined in order.
    pub fn plain_text(&self) -> String {
        match self {
            ContentValue::Text(text) => text.clone(),
            ContentValue::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// The first text fragment, used as the signature prompt.
    pub fn first_text(&self) -> &str {
        match self {
            ContentValue::Text(text) => text,
            ContentValue::Blocks(blocks) => blocks
                .iter()
                .find_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }

}

impl Default for ContentValue {
    fn default() -> Self {
        ContentValue::Text(String::new())
    }
}

/// A single content block in canonical (upstream) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageRef },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

/// A tool call carried on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Structured tool input re-serialized to JSON text
    pub arguments: String,
}

impl ToolCallRecord {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: String) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// A message in canonical form, serializing to the upstream shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: Role,
    pub content: ContentValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl CanonicalMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: ContentValue::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: Option<String>, text: String) -> Self {
        Self {
            role: Role::Tool,
            content: ContentValue::Text(text),
            tool_calls: None,
            tool_call_id,
        }
    }
}

/// A tool definition passed through to the upstream. Callers send either
/// the Anthropic shape (`name`/`input_schema`) or the OpenAI function
/// shape; unrecognized fields ride along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The single internal request shape all inbound schemas normalize into.
/// Serializes directly to the upstream chat-completions body.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<CanonicalMessage>,
    pub stream: bool,
    pub chat_id: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

impl CanonicalRequest {
    /// Whether thinking was negotiated on for this request.
    pub fn thinking_enabled(&self) -> bool {
        self.features
            .as_ref()
            .and_then(|features| features.get("enable_thinking"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// All message text, joined, for prompt token counting.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|message| message.content.plain_text())
            .collect()
    }

    /// Raw text of the most recent user message, empty if none.
    /// Block content contributes its first text fragment only.
    pub fn last_user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|message| message.role == Role::User)
            .last()
            .map(|message| match &message.content {
                ContentValue::Text(text) => text.clone(),
                blocks => blocks.first_text().to_string(),
            })
            .unwrap_or_default()
    }
}

/// Upstream-assigned label classifying the kind of content in a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Thinking,
    Answer,
    ToolCall,
    Other,
}

impl Phase {
    /// Map the upstream label; empty or unknown labels count as `Other`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "thinking" => Phase::Thinking,
            "answer" => Phase::Answer,
            "tool_call" => Phase::ToolCall,
            _ => Phase::Other,
        }
    }
}

/// One event from the upstream stream. `text` is the delta fragment if
/// present, else the edit replacement; the rewriter treats both the same.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEvent {
    pub phase: Phase,
    pub text: String,
    pub done: bool,
}

impl UpstreamEvent {
    pub fn new(phase: Phase, text: impl Into<String>) -> Self {
        Self {
            phase,
            text: text.into(),
            done: false,
        }
    }
}

/// A fully reconstructed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Parsed arguments object; `Null` when the arguments text was not
    /// itself valid JSON
    pub arguments: Value,
}

impl ToolInvocation {
    /// Arguments re-serialized to JSON text for OpenAI-style output.
    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| "null".to_string())
    }
}

/// The rewriter's per-event output.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedDelta {
    /// Thinking text surfaced as a separate reasoning stream
    Reasoning(String),
    /// Ordinary answer text
    Answer(String),
    /// A raw tool-call fragment awaiting reconstruction
    ToolCallFragment(String),
    /// A complete tool invocation
    ToolInvocation(ToolInvocation),
    /// Nothing to emit for this event
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_value_push_text_accumulates() {
        let mut content = ContentValue::Text("Hello".to_string());
        content.push_text(" world");
        assert_eq!(content, ContentValue::Text("Hello world".to_string()));
    }

    #[test]
    fn test_push_block_promotes_text_to_blocks() {
        let mut content = ContentValue::Text("look:".to_string());
        content.push_block(ContentBlock::ImageUrl {
            image_url: ImageRef {
                url: "https://img.test/a.png".to_string(),
            },
        });

        match &content {
            ContentValue::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert_eq!(
                    blocks[0],
                    ContentBlock::Text {
                        text: "look:".to_string()
                    }
                );
            }
            other => panic!("expected blocks, got {:?}", other),
        }
    }

    #[test]
    fn test_content_serialization_shapes() {
        let text = ContentValue::Text("hi".to_string());
        assert_eq!(serde_json::to_value(&text).unwrap(), json!("hi"));

        let blocks = ContentValue::Blocks(vec![ContentBlock::Text {
            text: "hi".to_string(),
        }]);
        assert_eq!(
            serde_json::to_value(&blocks).unwrap(),
            json!([{"type": "text", "text": "hi"}])
        );
    }

    #[test]
    fn test_phase_from_label() {
        assert_eq!(Phase::from_label("thinking"), Phase::Thinking);
        assert_eq!(Phase::from_label("answer"), Phase::Answer);
        assert_eq!(Phase::from_label("tool_call"), Phase::ToolCall);
        assert_eq!(Phase::from_label(""), Phase::Other);
        assert_eq!(Phase::from_label("heartbeat"), Phase::Other);
    }

    #[test]
    fn test_last_user_text_prefers_latest_user_message() {
        let request = CanonicalRequest {
            model: "glm-4.6".to_string(),
            messages: vec![
                CanonicalMessage::text(Role::User, "first"),
                CanonicalMessage::text(Role::Assistant, "reply"),
                CanonicalMessage::text(Role::User, "second"),
            ],
            stream: true,
            chat_id: "chat".to_string(),
            id: "msg".to_string(),
            features: None,
            tools: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            frequency_penalty: None,
            presence_penalty: None,
        };
        assert_eq!(request.last_user_text(), "second");
        assert_eq!(request.prompt_text(), "firstreplysecond");
    }

    #[test]
    fn test_thinking_enabled_reads_features() {
        let mut features = BTreeMap::new();
        features.insert("enable_thinking".to_string(), json!(true));
        let request = CanonicalRequest {
            model: "glm-4.6".to_string(),
            messages: vec![],
            stream: true,
            chat_id: "chat".to_string(),
            id: "msg".to_string(),
            features: Some(features),
            tools: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            frequency_penalty: None,
            presence_penalty: None,
        };
        assert!(request.thinking_enabled());
    }
}
