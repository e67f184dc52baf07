//! Calendar Alert Bot: binary entrypoint
//! Boots the Axum HTTP server: config, store, providers, Telegram sender,
//! routes and the optional in-process alert ticker.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use calendar_alert_bot::{app_with_metrics, config::is_truthy, Config};

/// Compact logs by default, JSON when `LOG_JSON=1`. Shuttle may already have
/// installed a subscriber, in which case this is a no-op.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("calendar_alert_bot=info,warn"));
    let json = std::env::var("LOG_JSON").is_ok_and(|v| is_truthy(&v));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let router = app_with_metrics(Config::from_env()).await?;
    Ok(router.into())
}
