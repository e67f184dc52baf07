//! Read path behind `/upcoming` and `GET /api/upcoming`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::event::EconomicEvent;
use crate::filter::{select, FilterParams, MAX_LIMIT, PREVIEW_WINDOW_MINUTES};
use crate::state::AppState;
use crate::store::UpcomingCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewSource {
    Cache,
    Live,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub events: Vec<EconomicEvent>,
    pub source: PreviewSource,
    pub computed_at: DateTime<Utc>,
}

/// Serve the cached list when present, minus releases already in the past.
/// On a miss, select the next 24h of major manual events, cache them, and
/// serve that.
pub async fn upcoming(state: &AppState, limit: usize, now: DateTime<Utc>) -> Preview {
    let limit = FilterParams::preview(limit).clamped_limit();

    if let Some(cached) = state.store.get_cache().await {
        let mut events: Vec<EconomicEvent> = cached
            .events
            .into_iter()
            .filter(|e| e.scheduled_at >= now)
            .collect();
        events.truncate(limit);
        return Preview {
            events,
            source: PreviewSource::Cache,
            computed_at: cached.computed_at,
        };
    }

    let to = now + ChronoDuration::minutes(PREVIEW_WINDOW_MINUTES);
    let manual = state.store.list_manual_events(now, to).await;
    let selection = select(
        now,
        manual,
        Vec::new(),
        &FilterParams::preview(MAX_LIMIT),
        &state.rules,
    );
    tracing::debug!(target: "pipeline", events = selection.events.len(), "upcoming cache miss, computed live");

    let record = UpcomingCache {
        computed_at: now,
        events: selection.events,
    };
    state.store.set_cache(&record, state.config.cache_ttl).await;

    let mut events = record.events;
    events.truncate(limit);
    Preview {
        events,
        source: PreviewSource::Live,
        computed_at: now,
    }
}
