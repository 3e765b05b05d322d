//! HTTP client for the upstream chat API.
//!
//! One shared `reqwest` client carries every upstream call: the signed
//! streaming chat POST, multipart image upload, and the user/model
//! metadata fetches. The client has no global timeout because chat
//! generation is long-lived; the short metadata calls set per-request
//! timeouts instead.

use crate::core::config::AppConfig;
use crate::core::error::{AppError, Result};
use crate::core::logging::generate_id;
use crate::services::signature::generate_signature;
use crate::services::user::UserInfo;
use crate::transformer::canonical::CanonicalRequest;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct UpstreamClient {
    config: Arc<AppConfig>,
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");
        Self { config, client }
    }

    /// POST the normalized request to the upstream chat endpoint and
    /// return the raw streaming response. When the user is authenticated
    /// the call carries the two-level signature; signing failure aborts
    /// the request rather than sending it unsigned.
    pub async fn send_chat(
        &self,
        request: &CanonicalRequest,
        user: &UserInfo,
    ) -> Result<reqwest::Response> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let request_id = generate_id();

        let mut params: Vec<(String, String)> = vec![
            ("timestamp".to_string(), timestamp.to_string()),
            ("requestId".to_string(), request_id.clone()),
        ];

        let mut body = serde_json::to_value(request)?;
        let mut signature_header = None;

        if !user.id.is_empty() {
            params.push(("user_id".to_string(), user.id.clone()));

            let last_user_message = request.last_user_text();
            let mut signature_params = BTreeMap::new();
            signature_params.insert("requestId".to_string(), request_id.clone());
            signature_params.insert("timestamp".to_string(), timestamp.to_string());
            signature_params.insert("user_id".to_string(), user.id.clone());

            let signed = generate_signature(&signature_params, &last_user_message)?;
            params.push((
                "signature_timestamp".to_string(),
                signed.timestamp.to_string(),
            ));
            signature_header = Some(signed.signature);
            body["signature_prompt"] = Value::String(last_user_message);
        }

        if self.config.debug {
            tracing::debug!("upstream chat body: {}", body);
        }

        let url = format!("{}/api/chat/completions", self.config.base_url);
        let mut builder = self
            .client
            .post(&url)
            .query(&params)
            .json(&body)
            .bearer_auth(&user.token)
            .header("Content-Type", "application/json")
            .header(
                "Referer",
                format!("{}/c/{}", self.config.base_url, request.chat_id),
            );
        for (key, value) in &self.config.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(signature) = signature_header {
            builder = builder.header("X-Signature", signature);
        }

        let response = builder.send().await?;
        tracing::debug!("upstream chat status: {}", response.status());
        Ok(response)
    }

    /// Upload a base64 data-URL image to the upstream file store.
    ///
    /// Returns `Ok(None)` when the upload does not apply (anonymous mode,
    /// or the URL is already hosted); the caller keeps the original URL.
    /// Decode and transport failures are errors the normalizer degrades
    /// to inline text.
    pub async fn upload_image(
        &self,
        data_url: &str,
        chat_id: &str,
        user: &UserInfo,
    ) -> Result<Option<String>> {
        if self.config.anonymous || !data_url.starts_with("data:") {
            return Ok(None);
        }

        let encoded = data_url
            .splitn(2, ',')
            .nth(1)
            .ok_or_else(|| AppError::BadRequest("invalid data URL format".to_string()))?;
        let image_data = STANDARD
            .decode(encoded)
            .map_err(|e| AppError::BadRequest(format!("failed to decode base64: {}", e)))?;

        let filename = generate_id();
        let form = Form::new().part("file", Part::bytes(image_data).file_name(filename));

        let url = format!("{}/api/v1/files/", self.config.base_url);
        let mut builder = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .bearer_auth(&user.token)
            .header("Referer", format!("{}/c/{}", self.config.base_url, chat_id));
        for (key, value) in &self.config.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status,
                message: format!("upload failed: {}", message),
            });
        }

        let uploaded: Value = response.json().await?;
        let id = uploaded.get("id").and_then(Value::as_str).unwrap_or("");
        let filename = uploaded
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or("");
        Ok(Some(format!("{}_{}", id, filename)))
    }

    /// Fetch the authenticated (or visitor) user record.
    pub async fn fetch_user(&self) -> Result<Value> {
        let url = format!("{}/api/v1/auths/", self.config.base_url);
        let mut builder = self
            .client
            .get(&url)
            .timeout(METADATA_TIMEOUT)
            .header("Content-Type", "application/json");
        for (key, value) in &self.config.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !self.config.anonymous && !self.config.token.is_empty() {
            builder = builder.bearer_auth(&self.config.token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status,
                message: format!("fetch user info failed: {}", message),
            });
        }
        Ok(response.json().await?)
    }

    /// Fetch the raw upstream model list.
    pub async fn fetch_models(&self, token: &str) -> Result<Value> {
        let url = format!("{}/api/models", self.config.base_url);
        let mut builder = self
            .client
            .get(&url)
            .timeout(METADATA_TIMEOUT)
            .bearer_auth(token)
            .header("Content-Type", "application/json");
        for (key, value) in &self.config.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status,
                message: format!("fetch models failed: {}", message),
            });
        }
        Ok(response.json().await?)
    }
}
