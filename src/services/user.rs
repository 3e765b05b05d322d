//! User identity with TTL caching.
//!
//! The upstream wants a user id and bearer token on every call. For a
//! configured token the identity is cached for 30 minutes; anonymous mode
//! fetches a fresh visitor token per request because the token itself
//! comes out of the response. The clock is injected so tests can control
//! expiry.

use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::services::upstream::UpstreamClient;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Time source abstraction; tests drive a manual clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The identity attached to upstream calls. An empty `id` means the
/// upstream treats the caller as an anonymous visitor (no signature).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub token: String,
}

struct CachedUser {
    id: String,
    name: String,
    cached_at: DateTime<Utc>,
}

pub struct UserService {
    config: Arc<AppConfig>,
    upstream: Arc<UpstreamClient>,
    clock: Arc<dyn Clock>,
    cache: RwLock<HashMap<String, CachedUser>>,
}

fn cache_ttl() -> Duration {
    Duration::minutes(30)
}

impl UserService {
    pub fn new(config: Arc<AppConfig>, upstream: Arc<UpstreamClient>) -> Self {
        Self::with_clock(config, upstream, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Arc<AppConfig>,
        upstream: Arc<UpstreamClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            upstream,
            clock,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get the current user, from cache when fresh.
    pub async fn get_user(&self) -> Result<UserInfo> {
        let current_token = if self.config.anonymous {
            String::new()
        } else {
            self.config.token.clone()
        };

        if !current_token.is_empty() {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&current_token) {
                if self.clock.now() - cached.cached_at < cache_ttl() {
                    tracing::debug!(
                        "User info [cached]: id={}, token={}...",
                        cached.id,
                        truncate(&current_token, 50)
                    );
                    return Ok(UserInfo {
                        id: cached.id.clone(),
                        name: cached.name.clone(),
                        token: current_token.clone(),
                    });
                }
            }
        }

        let raw = self.upstream.fetch_user().await?;
        let id = string_field(&raw, "id");
        let name = string_field(&raw, "name");
        let token = if self.config.anonymous {
            string_field(&raw, "token")
        } else {
            current_token
        };

        if !token.is_empty() && !id.is_empty() {
            let mut cache = self.cache.write().await;
            cache.insert(
                token.clone(),
                CachedUser {
                    id: id.clone(),
                    name: name.clone(),
                    cached_at: self.clock.now(),
                },
            );
        }

        tracing::debug!(
            "User info [live]: name={}, id={}, token={}...",
            name,
            id,
            truncate(&token, 50)
        );
        Ok(UserInfo { id, name, token })
    }

    /// Empty the cache; the next call fetches live.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
        tracing::debug!("User cache cleared");
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        &s[..max_len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        fn advance(&self, delta: Duration) {
            let mut now = self.now.lock().unwrap();
            *now = *now + delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    async fn mock_user_endpoint(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/api/v1/auths/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-1",
                "name": "Test User",
                "token": "ignored-in-authenticated-mode"
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_authenticated_user_is_cached_within_ttl() {
        let server = MockServer::start().await;
        mock_user_endpoint(&server, 1).await;

        let config = Arc::new(AppConfig::with_base_url(server.uri(), "configured-token"));
        let upstream = Arc::new(UpstreamClient::new(config.clone()));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = UserService::with_clock(config, upstream, clock.clone());

        let first = service.get_user().await.unwrap();
        assert_eq!(first.id, "user-1");
        assert_eq!(first.token, "configured-token");

        clock.advance(Duration::minutes(10));
        let second = service.get_user().await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let server = MockServer::start().await;
        mock_user_endpoint(&server, 2).await;

        let config = Arc::new(AppConfig::with_base_url(server.uri(), "configured-token"));
        let upstream = Arc::new(UpstreamClient::new(config.clone()));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = UserService::with_clock(config, upstream, clock.clone());

        service.get_user().await.unwrap();
        clock.advance(Duration::minutes(31));
        service.get_user().await.unwrap();
    }

    #[tokio::test]
    async fn test_anonymous_mode_always_fetches_live() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auths/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "",
                "name": "Visitor",
                "token": "visitor-token"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let config = Arc::new(AppConfig::with_base_url(server.uri(), ""));
        let upstream = Arc::new(UpstreamClient::new(config.clone()));
        let service = UserService::new(config, upstream);

        let user = service.get_user().await.unwrap();
        assert_eq!(user.id, "");
        assert_eq!(user.token, "visitor-token");
        service.get_user().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let server = MockServer::start().await;
        mock_user_endpoint(&server, 2).await;

        let config = Arc::new(AppConfig::with_base_url(server.uri(), "configured-token"));
        let upstream = Arc::new(UpstreamClient::new(config.clone()));
        let service = UserService::new(config, upstream);

        service.get_user().await.unwrap();
        service.clear().await;
        service.get_user().await.unwrap();
    }
}
