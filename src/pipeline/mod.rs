//! One alert run: subscribers → providers + manual events → filter →
//! cache → history dedupe → broadcast.

pub mod preview;
pub mod scheduler;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::config::is_truthy;
use crate::filter::{
    drop_already_sent, select, window_end, FilterParams, Mode, ALERT_WINDOW_MINUTES, DEFAULT_LIMIT,
    MAX_WINDOW_MINUTES,
};
use crate::notify::Lang;
use crate::state::AppState;
use crate::store::UpcomingCache;

/// Where events come from. `Manual` skips the upstream providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Provider,
    Manual,
}

impl Source {
    pub fn parse(raw: &str) -> Option<Source> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "provider" | "api" | "auto" => Some(Source::Provider),
            "manual" | "store" => Some(Source::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertParams {
    pub window_minutes: i64,
    pub mode: Mode,
    pub limit: usize,
    pub lang: Lang,
    pub dry_run: bool,
    pub source: Source,
}

impl Default for AlertParams {
    fn default() -> Self {
        Self {
            window_minutes: ALERT_WINDOW_MINUTES,
            mode: Mode::Major,
            limit: DEFAULT_LIMIT,
            lang: Lang::Both,
            dry_run: false,
            source: Source::Provider,
        }
    }
}

impl AlertParams {
    pub fn filter(&self) -> FilterParams {
        FilterParams {
            window_minutes: self.window_minutes,
            mode: self.mode,
            limit: self.limit,
        }
    }
}

/// Raw trigger query. Every field is text so a bad value falls back to the
/// default instead of rejecting the scheduler's call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertQuery {
    pub minutes: Option<String>,
    pub days: Option<String>,
    pub mode: Option<String>,
    pub limit: Option<String>,
    pub lang: Option<String>,
    pub dry: Option<String>,
    pub source: Option<String>,
}

impl AlertQuery {
    pub fn into_params(self) -> AlertParams {
        let d = AlertParams::default();
        let int = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<i64>().ok());

        let window_minutes = match int(&self.days) {
            Some(days) => days.saturating_mul(24 * 60),
            None => int(&self.minutes).unwrap_or(d.window_minutes),
        }
        .clamp(0, MAX_WINDOW_MINUTES);

        AlertParams {
            window_minutes,
            mode: self.mode.as_deref().and_then(Mode::parse).unwrap_or(d.mode),
            limit: int(&self.limit)
                .map(|l| FilterParams { limit: l.max(0) as usize, ..d.filter() }.clamped_limit())
                .unwrap_or(d.limit),
            lang: self.lang.as_deref().and_then(Lang::parse).unwrap_or(d.lang),
            dry_run: self.dry.as_deref().is_some_and(is_truthy),
            source: self.source.as_deref().and_then(Source::parse).unwrap_or(d.source),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertReport {
    pub subscribers: usize,
    /// Provider that supplied events, if any.
    pub provider: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_errors: Vec<String>,
    pub total_events: usize,
    pub filtered: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_deduped: usize,
    pub dry_run: bool,
    pub params: AlertParams,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<String>,
}

impl AlertReport {
    fn empty(params: AlertParams) -> Self {
        Self {
            subscribers: 0,
            provider: None,
            provider_errors: Vec::new(),
            total_events: 0,
            filtered: 0,
            sent: 0,
            failed: 0,
            skipped_deduped: 0,
            dry_run: params.dry_run,
            params,
            previews: Vec::new(),
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("calendar_pipeline_runs_total", "Alert pipeline runs.");
        describe_counter!("calendar_alerts_sent_total", "Messages delivered to subscribers.");
        describe_counter!("calendar_send_failures_total", "Failed subscriber sends.");
        describe_counter!("calendar_store_errors_total", "Key-value store call failures.");
        describe_gauge!("calendar_pipeline_last_run_ts", "Unix time of the last completed run.");
    });
}

/// Run the alert pipeline once. Never fails: store, provider and send
/// errors are logged and show up as smaller counts in the report.
pub async fn run_alerts(state: &AppState, params: AlertParams, now: DateTime<Utc>) -> AlertReport {
    ensure_metrics_described();
    counter!("calendar_pipeline_runs_total").increment(1);
    let mut report = AlertReport::empty(params);

    let subscribers = state.store.list_subscribers().await;
    report.subscribers = subscribers.len();
    if subscribers.is_empty() {
        tracing::info!(target: "pipeline", "no subscribers, skipping run");
        gauge!("calendar_pipeline_last_run_ts").set(now.timestamp() as f64);
        return report;
    }

    let to = window_end(now, params.window_minutes);
    let provider_events = match params.source {
        Source::Provider => {
            let fetch = state.providers.fetch_events(now, to).await;
            report.provider = fetch.source;
            report.provider_errors = fetch.errors;
            fetch.events
        }
        Source::Manual => Vec::new(),
    };
    let manual = state.store.list_manual_events(now, to).await;

    let selection = select(now, manual, provider_events, &params.filter(), &state.rules);
    report.total_events = selection.merged_total;
    report.filtered = selection.events.len();

    if !params.dry_run {
        let record = UpcomingCache {
            computed_at: now,
            events: selection.events.clone(),
        };
        state.store.set_cache(&record, state.config.cache_ttl).await;
    }

    let (pending, already_sent) =
        drop_already_sent(&state.store, selection.events, state.config.dedupe_scope).await;

    let broadcast = state
        .dispatcher()
        .broadcast(&pending, &subscribers, params.lang, params.dry_run)
        .await;
    report.sent = broadcast.sent;
    report.failed = broadcast.failed;
    report.skipped_deduped = already_sent + broadcast.skipped_deduped;
    report.previews = broadcast.previews;

    gauge!("calendar_pipeline_last_run_ts").set(now.timestamp() as f64);
    tracing::info!(
        target: "pipeline",
        subscribers = report.subscribers,
        provider = report.provider.unwrap_or("none"),
        total = report.total_events,
        filtered = report.filtered,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped_deduped,
        dry_run = report.dry_run,
        "alert run finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(pairs: &[(&str, &str)]) -> AlertParams {
        let mut query = AlertQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "minutes" => query.minutes = v,
                "days" => query.days = v,
                "mode" => query.mode = v,
                "limit" => query.limit = v,
                "lang" => query.lang = v,
                "dry" => query.dry = v,
                "source" => query.source = v,
                _ => unreachable!(),
            }
        }
        query.into_params()
    }

    #[test]
    fn empty_query_gives_defaults() {
        assert_eq!(q(&[]), AlertParams::default());
    }

    #[test]
    fn days_override_minutes() {
        let p = q(&[("minutes", "30"), ("days", "2")]);
        assert_eq!(p.window_minutes, 2 * 24 * 60);
    }

    #[test]
    fn bad_values_fall_back_and_limits_clamp() {
        let p = q(&[
            ("minutes", "soon"),
            ("mode", "ALL"),
            ("limit", "500"),
            ("lang", "en"),
            ("dry", "1"),
            ("source", "manual"),
        ]);
        assert_eq!(p.window_minutes, ALERT_WINDOW_MINUTES);
        assert_eq!(p.mode, Mode::All);
        assert_eq!(p.limit, 50);
        assert_eq!(p.lang, Lang::En);
        assert!(p.dry_run);
        assert_eq!(p.source, Source::Manual);

        assert_eq!(q(&[("minutes", "-10")]).window_minutes, 0);
        assert_eq!(q(&[("limit", "0")]).limit, 1);
    }

    #[test]
    fn huge_windows_are_clamped() {
        assert_eq!(q(&[("days", "200000000")]).window_minutes, MAX_WINDOW_MINUTES);
        let max = i64::MAX.to_string();
        assert_eq!(q(&[("minutes", max.as_str())]).window_minutes, MAX_WINDOW_MINUTES);
        assert_eq!(q(&[("days", "-3")]).window_minutes, 0);
    }
}
