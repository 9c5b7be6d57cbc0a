//! News Relay Bot — Binary Entrypoint
//! Boots the Axum HTTP surface: the scheduled-trigger route, the Discord
//! interactions handshake, and Prometheus metrics.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsdrop::api::{self, AppState};
use newsdrop::config::BotConfig;
use newsdrop::metrics::Metrics;
use newsdrop::secrets::EnvSecretStore;
use newsdrop::store::FsBlobStore;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - NEWSDROP_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("NEWSDROP_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newsdrop=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This supplies the
    // secret env vars (DISCORD_BOT_SECRET, BLUESKY_SECRET) and config knobs.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let config = Arc::new(BotConfig::from_env());
    let metrics = Metrics::init(config.max_active_threads);

    let state = AppState {
        store: Arc::new(FsBlobStore::new(config.state_dir.clone())),
        secrets: Arc::new(EnvSecretStore),
        config,
    };

    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
