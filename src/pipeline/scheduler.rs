use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::{run_alerts, AlertParams};
use crate::state::AppState;

/// In-process stand-in for an external cron: runs the pipeline with default
/// parameters every `every`. The first run happens one period after start.
pub fn spawn_alert_ticker(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        tracing::info!(target: "pipeline", every_secs = every.as_secs(), "alert ticker started");
        loop {
            ticker.tick().await;
            let report = run_alerts(&state, AlertParams::default(), Utc::now()).await;
            tracing::debug!(target: "pipeline", sent = report.sent, "scheduled run done");
        }
    })
}
