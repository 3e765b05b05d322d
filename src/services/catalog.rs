//! Model catalog with display-name formatting and alias resolution.
//!
//! The upstream's model list uses internal ids ("source" ids) that differ
//! from the friendly ids this gateway exposes. The catalog caches the
//! fetched list until cleared, derives a display name and lowercase
//! display id for each model, and answers two questions for the
//! normalizer: which internal id a display id maps back to, and whether a
//! model supports thinking.

use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::services::upstream::UpstreamClient;
use crate::services::user::UserInfo;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One catalog entry derived from the upstream model list.
#[derive(Debug, Clone)]
pub struct CatalogModel {
    /// Lowercased display name; the id this gateway exposes
    pub display_id: String,
    pub name: String,
    /// The upstream's own id for the model
    pub internal_id: String,
    pub created: i64,
    pub capabilities: Value,
    pub description: String,
    pub hidden: bool,
}

pub struct ModelCatalog {
    config: Arc<AppConfig>,
    upstream: Arc<UpstreamClient>,
    cache: RwLock<Option<Arc<Vec<CatalogModel>>>>,
}

impl ModelCatalog {
    pub fn new(config: Arc<AppConfig>, upstream: Arc<UpstreamClient>) -> Self {
        Self {
            config,
            upstream,
            cache: RwLock::new(None),
        }
    }

    /// Fetch-and-cache the model list. Cached unconditionally until
    /// [`ModelCatalog::clear`] is called.
    pub async fn models(&self, user: &UserInfo) -> Result<Arc<Vec<CatalogModel>>> {
        {
            let cache = self.cache.read().await;
            if let Some(models) = cache.as_ref() {
                return Ok(models.clone());
            }
        }

        let token = if self.config.anonymous {
            user.token.clone()
        } else {
            self.config.token.clone()
        };

        let raw = self.upstream.fetch_models(&token).await?;
        let models = Arc::new(parse_models(&raw));
        tracing::info!("Fetched {} models from upstream", models.len());

        let mut cache = self.cache.write().await;
        *cache = Some(models.clone());
        Ok(models)
    }

    /// Empty the cache; the next call fetches live.
    pub async fn clear(&self) {
        *self.cache.write().await = None;
        tracing::debug!("Model catalog cleared");
    }

    /// Resolve a display id back to the upstream's internal id.
    /// Exact match on the display id only; anything else (including a
    /// failed catalog fetch) resolves to `None` and the caller passes the
    /// id through unchanged.
    pub async fn resolve_internal(&self, display_id: &str, user: &UserInfo) -> Option<String> {
        let models = self.models(user).await.ok()?;
        models
            .iter()
            .find(|model| model.display_id == display_id && model.internal_id != display_id)
            .map(|model| model.internal_id.clone())
    }

    /// Whether the model's capability metadata marks thinking supported.
    /// `None` when the model is unknown or carries no explicit flag.
    pub async fn thinking_supported(&self, model_id: &str, user: &UserInfo) -> Option<bool> {
        let models = self.models(user).await.ok()?;
        models
            .iter()
            .find(|model| model.display_id == model_id || model.internal_id == model_id)
            .and_then(|model| model.capabilities.get("think"))
            .and_then(Value::as_bool)
    }

    /// The model list in OpenAI `/v1/models` form.
    pub async fn openai_list(&self, user: &UserInfo) -> Result<Value> {
        let models = self.models(user).await?;
        let data: Vec<Value> = models
            .iter()
            .map(|model| {
                json!({
                    "id": model.display_id,
                    "object": "model",
                    "name": model.name,
                    "created": model.created,
                    "owned_by": "z.ai",
                })
            })
            .collect();
        Ok(json!({ "object": "list", "data": data }))
    }

    #[cfg(test)]
    pub(crate) async fn prime(&self, models: Vec<CatalogModel>) {
        *self.cache.write().await = Some(Arc::new(models));
    }
}

/// Map the raw upstream model list into catalog entries, skipping
/// inactive models.
pub fn parse_models(raw: &Value) -> Vec<CatalogModel> {
    let mut models = Vec::new();
    let Some(entries) = raw.get("data").and_then(Value::as_array) else {
        return models;
    };

    for entry in entries {
        let info = entry.get("info").cloned().unwrap_or(Value::Null);
        if info.get("is_active").and_then(Value::as_bool) == Some(false) {
            continue;
        }

        let internal_id = entry.get("id").and_then(Value::as_str).unwrap_or("");
        if internal_id.is_empty() {
            continue;
        }
        let raw_name = entry.get("name").and_then(Value::as_str).unwrap_or("");

        let meta = info.get("meta").cloned().unwrap_or(Value::Null);
        let capabilities = meta
            .get("capabilities")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let description = meta
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let hidden = meta.get("hidden").and_then(Value::as_bool).unwrap_or(false);
        let created = info
            .get("created_at")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| chrono::Utc::now().timestamp());

        let name = display_name(internal_id, raw_name);
        models.push(CatalogModel {
            display_id: name.to_lowercase(),
            name,
            internal_id: internal_id.to_string(),
            created,
            capabilities,
            description,
            hidden,
        });
    }

    models
}

/// Derive the display name for a model.
///
/// Models already carrying a series name with a version dot (GLM-4.6,
/// Z1.5, ...) keep it; otherwise the source id is title-cased and given a
/// GLM prefix when it lacks a series marker.
fn display_name(internal_id: &str, raw_name: &str) -> String {
    let has_series = |s: &str| (s.starts_with("GLM") || s.starts_with('Z')) && s.contains('.');

    if has_series(internal_id) {
        return internal_id.to_string();
    }
    if has_series(raw_name) {
        return raw_name.to_string();
    }

    if raw_name.is_empty() || !raw_name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        let formatted = format_model_name(internal_id);
        let upper = formatted.to_uppercase();
        if upper.starts_with("GLM") || upper.starts_with('Z') {
            return formatted;
        }
        return format!("GLM-{}", formatted);
    }

    raw_name.to_string()
}

/// Uppercase the first dash-part and title-case the alphabetic rest:
/// `deep-research` becomes `DEEP-Research`.
fn format_model_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    let mut parts = name.split('-');
    let first = parts.next().unwrap_or("").to_uppercase();
    let mut formatted = vec![first];
    for part in parts {
        if part.is_empty() || part.chars().all(|c| c.is_ascii_digit()) {
            formatted.push(part.to_string());
        } else if part.chars().any(|c| c.is_ascii_alphabetic()) {
            formatted.push(title_case(part));
        } else {
            formatted.push(part.to_string());
        }
    }
    formatted.join("-")
}

fn title_case(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Value {
        json!({
            "data": [
                {
                    "id": "0727-360B-API",
                    "name": "GLM-4.5",
                    "info": {
                        "is_active": true,
                        "created_at": 1_722_000_000,
                        "meta": {
                            "capabilities": {"think": true, "vision": false},
                            "description": "flagship",
                            "hidden": false
                        }
                    }
                },
                {
                    "id": "deep-research",
                    "name": "1.5-preview",
                    "info": {
                        "is_active": true,
                        "meta": {"capabilities": {"think": false}}
                    }
                },
                {
                    "id": "retired-model",
                    "name": "Old",
                    "info": {"is_active": false}
                }
            ]
        })
    }

    #[test]
    fn test_parse_models_skips_inactive() {
        let models = parse_models(&fixture());
        assert_eq!(models.len(), 2);
    }

    #[test]
    fn test_series_name_kept_verbatim() {
        let models = parse_models(&fixture());
        let glm = &models[0];
        assert_eq!(glm.name, "GLM-4.5");
        assert_eq!(glm.display_id, "glm-4.5");
        assert_eq!(glm.internal_id, "0727-360B-API");
        assert_eq!(glm.created, 1_722_000_000);
        assert_eq!(glm.capabilities["think"], json!(true));
    }

    #[test]
    fn test_non_letter_name_formatted_from_source_id() {
        let models = parse_models(&fixture());
        let research = &models[1];
        assert_eq!(research.name, "GLM-DEEP-Research");
        assert_eq!(research.display_id, "glm-deep-research");
    }

    #[test]
    fn test_format_model_name() {
        assert_eq!(format_model_name("deep-research"), "DEEP-Research");
        assert_eq!(format_model_name("glm-4-32b"), "GLM-4-32b");
        assert_eq!(format_model_name("solo"), "SOLO");
        assert_eq!(format_model_name(""), "");
    }

    #[test]
    fn test_parse_models_tolerates_missing_data() {
        assert!(parse_models(&json!({})).is_empty());
        assert!(parse_models(&json!({"data": "nope"})).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_internal_exact_match_only() {
        let config = Arc::new(AppConfig::with_base_url("http://127.0.0.1:1", ""));
        let upstream = Arc::new(UpstreamClient::new(config.clone()));
        let catalog = ModelCatalog::new(config, upstream);
        catalog.prime(parse_models(&fixture())).await;

        let user = UserInfo::default();
        assert_eq!(
            catalog.resolve_internal("glm-4.5", &user).await,
            Some("0727-360B-API".to_string())
        );
        assert_eq!(catalog.resolve_internal("glm-4.9", &user).await, None);
    }

    #[tokio::test]
    async fn test_thinking_supported_matches_either_id() {
        let config = Arc::new(AppConfig::with_base_url("http://127.0.0.1:1", ""));
        let upstream = Arc::new(UpstreamClient::new(config.clone()));
        let catalog = ModelCatalog::new(config, upstream);
        catalog.prime(parse_models(&fixture())).await;

        let user = UserInfo::default();
        assert_eq!(
            catalog.thinking_supported("glm-4.5", &user).await,
            Some(true)
        );
        assert_eq!(
            catalog.thinking_supported("0727-360B-API", &user).await,
            Some(true)
        );
        assert_eq!(
            catalog.thinking_supported("glm-deep-research", &user).await,
            Some(false)
        );
        assert_eq!(catalog.thinking_supported("unknown", &user).await, None);
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_none() {
        let config = Arc::new(AppConfig::with_base_url("http://127.0.0.1:1", ""));
        let upstream = Arc::new(UpstreamClient::new(config.clone()));
        let catalog = ModelCatalog::new(config, upstream);

        let user = UserInfo::default();
        assert_eq!(catalog.resolve_internal("glm-4.5", &user).await, None);
        assert_eq!(catalog.thinking_supported("glm-4.5", &user).await, None);
    }
}
