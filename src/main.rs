//! zai-proxy - Main entry point.
//!
//! Loads configuration from the environment, initializes logging and
//! metrics, and serves the gateway.

use anyhow::Result;
use chrono::Local;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zai_proxy::{api::build_router, api::AppState, core::init_metrics, AppConfig};

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    // Honor RUST_LOG but always suppress noisy HTTP library logs
    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,zai_proxy=debug".to_string());
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{},hyper=warn,h2=warn,reqwest=warn",
        base_filter
    ));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTime))
        .init();

    init_metrics();

    let config = AppConfig::from_env()?;
    let port = config.port;

    tracing::info!("---------------------------------------------------------------------");
    tracing::info!("zai-proxy - OpenAI/Anthropic compatible gateway for Z.ai");
    tracing::info!("---------------------------------------------------------------------");
    tracing::info!("Base:           {}", config.base_url);
    tracing::info!("Port:           {}", config.port);
    tracing::info!("Think Mode:     {}", config.think_mode);
    tracing::info!("Anonymous Mode: {}", config.anonymous);
    tracing::info!("Debug Mode:     {}", config.debug);
    tracing::info!("---------------------------------------------------------------------");
    tracing::info!("Available Endpoints:");
    tracing::info!("  GET  /health                  - Health check");
    tracing::info!("  GET  /v1/models               - List models");
    tracing::info!("  POST /v1/chat/completions     - OpenAI chat completions");
    tracing::info!("  POST /v1/messages             - Anthropic messages");
    tracing::info!("  GET  /metrics                 - Prometheus metrics");
    tracing::info!("---------------------------------------------------------------------");

    let state = Arc::new(AppState::new(config));
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
