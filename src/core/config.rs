//! Configuration management for the Z.ai gateway.
//!
//! All configuration is environment-driven (optionally via a `.env` file
//! loaded in `main`). Invalid values fall back to safe defaults with a
//! warning rather than aborting startup.

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;

/// How reasoning ("thinking") content is surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkMode {
    /// Emit thinking text as a separate `reasoning_content` delta stream.
    Reasoning,
    /// Wrap thinking text in `<think>...</think>` tags inside the answer.
    Think,
    /// Remove the reasoning tags and keep the inner text inline.
    Strip,
    /// Wrap thinking text in a collapsible `<details>` block with a summary trailer.
    Details,
}

impl ThinkMode {
    /// Parse a mode label. Returns `None` for unrecognized values;
    /// the config loader substitutes [`ThinkMode::Reasoning`] in that case.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reasoning" => Some(ThinkMode::Reasoning),
            "think" => Some(ThinkMode::Think),
            "strip" => Some(ThinkMode::Strip),
            "details" => Some(ThinkMode::Details),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkMode::Reasoning => "reasoning",
            ThinkMode::Think => "think",
            ThinkMode::Strip => "strip",
            ThinkMode::Details => "details",
        }
    }
}

impl fmt::Display for ThinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Upstream base URL, no trailing slash (e.g. `https://chat.z.ai`)
    pub base_url: String,

    /// Upstream account token; empty means anonymous (visitor) mode
    pub token: String,

    /// Derived from `token`: true when no token is configured
    pub anonymous: bool,

    /// Port the gateway listens on
    pub port: u16,

    /// Model id substituted when the caller omits one
    pub default_model: String,

    /// Reasoning-content rendering policy, fixed for the process lifetime
    pub think_mode: ThinkMode,

    /// Verbose request/response logging
    pub debug: bool,

    /// Browser-emulation headers sent with every upstream call
    pub headers: HashMap<String, String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url = env_or("UPSTREAM_BASE_URL", "https://chat.z.ai")
            .trim()
            .trim_end_matches('/')
            .to_string();
        let token = env_or("TOKEN", "").trim().to_string();

        let port = match env_or("PORT", "").parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ if std::env::var("PORT").is_err() => 8080,
            _ => {
                tracing::warn!(
                    "Invalid PORT '{}', using 8080",
                    std::env::var("PORT").unwrap_or_default()
                );
                8080
            }
        };

        let think_raw = env_or("THINK_TAGS_MODE", "reasoning");
        let think_mode = ThinkMode::parse(&think_raw).unwrap_or_else(|| {
            tracing::warn!("Invalid THINK_TAGS_MODE '{}', using 'reasoning'", think_raw);
            ThinkMode::Reasoning
        });

        let mut config = Self::with_base_url(base_url, token);
        config.port = port;
        config.default_model = env_or("MODEL", "glm-4.6");
        config.think_mode = think_mode;
        config.debug = str_to_bool(&env_or("DEBUG", "false"));
        Ok(config)
    }

    /// Build a configuration with defaults for everything except the
    /// upstream location and token. Used by `from_env` and by tests that
    /// point the gateway at a mock upstream.
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let token = token.into();
        let anonymous = token.is_empty();
        let headers = browser_headers(&base_url);
        Self {
            base_url,
            token,
            anonymous,
            port: 8080,
            default_model: "glm-4.6".to_string(),
            think_mode: ThinkMode::Reasoning,
            debug: false,
            headers,
        }
    }
}

/// The fixed header set the upstream web client sends; the upstream rejects
/// requests that do not look like its own frontend.
fn browser_headers(base_url: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Accept".to_string(), "*/*".to_string());
    headers.insert("Accept-Language".to_string(), "en-US".to_string());
    headers.insert("Cache-Control".to_string(), "no-cache".to_string());
    headers.insert("Pragma".to_string(), "no-cache".to_string());
    headers.insert(
        "Sec-Ch-Ua".to_string(),
        r#""Microsoft Edge";v="141", "Not?A_Brand";v="8""#.to_string(),
    );
    headers.insert("Sec-Ch-Ua-Mobile".to_string(), "?0".to_string());
    headers.insert("Sec-Ch-Ua-Platform".to_string(), "Linux".to_string());
    headers.insert("Sec-Fetch-Dest".to_string(), "empty".to_string());
    headers.insert("Sec-Fetch-Mode".to_string(), "cors".to_string());
    headers.insert("Sec-Fetch-Site".to_string(), "same-origin".to_string());
    headers.insert(
        "User-Agent".to_string(),
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/141.0.0.0 Safari/537.36 Edg/141.0.0.0"
            .to_string(),
    );
    headers.insert("X-FE-Version".to_string(), "prod-fe-1.0.117".to_string());
    headers.insert("Origin".to_string(), base_url.to_string());
    headers.insert("Referer".to_string(), format!("{}/", base_url));
    headers
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
