//! Inbound wire types.
//!
//! One request struct covers both public schemas: OpenAI chat completions
//! and Anthropic messages are supersets of each other here, and the
//! normalizer sorts out which fields apply. Optional fields deserialize
//! leniently — a malformed optional field is treated as absent, never as
//! a request error. Only an unparsable message list rejects the request.

use crate::transformer::canonical::{Role, ToolCallRecord, ToolSpec};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Deserialize an optional field tolerantly: missing, null, or
/// wrongly-typed values all become `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A chat request in either public schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default, deserialize_with = "lenient")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default, deserialize_with = "lenient")]
    pub stream: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub stream_options: Option<StreamOptions>,
    /// Anthropic-style system prompt: a string or a list of text blocks
    #[serde(default, deserialize_with = "lenient")]
    pub system: Option<SystemPrompt>,
    /// Anthropic-style thinking toggle: `{"type": "enabled"|"disabled"}`
    #[serde(default, deserialize_with = "lenient")]
    pub thinking: Option<ThinkingToggle>,
    /// Qwen-style thinking flag
    #[serde(default, deserialize_with = "lenient")]
    pub enable_thinking: Option<bool>,
    /// Pre-shaped upstream feature map, merged as-is
    #[serde(default, deserialize_with = "lenient")]
    pub features: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default, deserialize_with = "lenient")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub top_p: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub max_tokens: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub presence_penalty: Option<f64>,
}

impl ChatRequest {
    pub fn stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn include_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .map(|options| options.include_usage)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamOptions {
    #[serde(default = "default_true")]
    pub include_usage: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThinkingToggle {
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl ThinkingToggle {
    pub fn enabled(&self) -> bool {
        self.kind.eq_ignore_ascii_case("enabled")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<InboundContent>,
    /// OpenAI-style tool calls on an assistant message, forwarded as-is
    #[serde(default, deserialize_with = "lenient")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    /// OpenAI-style tool-result linkage on a tool message
    #[serde(default, deserialize_with = "lenient")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundContent {
    Text(String),
    Blocks(Vec<InboundBlock>),
}

/// The closed set of inbound content blocks across both schemas.
/// Unknown block types parse to `Unknown` and are skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    /// OpenAI image block
    ImageUrl {
        #[serde(default)]
        image_url: Option<ImageUrl>,
    },
    /// Anthropic image block
    Image {
        #[serde(default)]
        source: Option<ImageSource>,
    },
    /// Anthropic tool use, valid on assistant messages
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Anthropic tool result, converted to a separate tool-role message
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUrl {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub data: String,
}

impl ImageSource {
    /// Render the Anthropic base64 source as a data URL.
    pub fn to_data_url(&self) -> Option<String> {
        if self.kind != "base64" || self.data.is_empty() {
            return None;
        }
        let media_type = if self.media_type.is_empty() {
            "image/jpeg"
        } else {
            &self.media_type
        };
        Some(format!("data:{};base64,{}", media_type, self.data))
    }
}
