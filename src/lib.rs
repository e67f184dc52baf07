// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod providers;
pub mod state;
pub mod store;
pub mod subscriber;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::Config;
pub use crate::event::{Country, EconomicEvent, Importance};
pub use crate::pipeline::{run_alerts, AlertParams, AlertReport};
pub use crate::state::AppState;

use axum::Router;

/// Build the full application from configuration: state, optional ticker,
/// and the HTTP router. `/metrics` is merged by the caller when a recorder
/// is installed.
pub async fn app(config: Config) -> anyhow::Result<(AppState, Router)> {
    let state = AppState::from_config(config).await?;
    if let Some(every) = state.config.alert_tick {
        pipeline::scheduler::spawn_alert_ticker(state.clone(), every);
    }
    let router = api::router(state.clone());
    Ok((state, router))
}

/// `app` with `/metrics` merged in. The recorder goes in first so metric
/// descriptions registered while wiring the app reach Prometheus.
pub async fn app_with_metrics(config: Config) -> anyhow::Result<Router> {
    let exporter = match crate::metrics::Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };
    let (_state, router) = app(config).await?;
    Ok(match exporter {
        Some(m) => router.merge(m.router()),
        None => router,
    })
}
