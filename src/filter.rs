//! # Filter & Dedupe Engine
//! Pure selection over normalized events: merge → window → country →
//! keyword (major mode) → sort/limit. The only I/O is the final check
//! against sent markers in `drop_already_sent`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::event::{Country, EconomicEvent};
use crate::store::{sent_marker_key, DedupeScope, EventStore};

pub const ALERT_WINDOW_MINUTES: i64 = 60;
pub const PREVIEW_WINDOW_MINUTES: i64 = 24 * 60;
pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 50;
/// Widest window a caller may ask for; matches manual event retention.
pub const MAX_WINDOW_MINUTES: i64 = 90 * 24 * 60;

pub const DEFAULT_COUNTRIES: [Country; 6] = [
    Country::UnitedStates,
    Country::EuroArea,
    Country::UnitedKingdom,
    Country::Japan,
    Country::China,
    Country::Germany,
];

pub const DEFAULT_KEYWORDS: [&str; 21] = [
    "cpi", "ppi", "pce", "nfp", "nonfarm", "non-farm", "payroll", "fomc", "fed", "ecb", "boe",
    "boj", "pboc", "lpr", "rate", "interest", "gdp", "pmi", "unemployment", "jobless", "inflation",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// High-impact keyword allow-list only.
    #[default]
    Major,
    All,
}

impl Mode {
    pub fn parse(raw: &str) -> Option<Mode> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "major" | "important" => Some(Mode::Major),
            "all" => Some(Mode::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterParams {
    pub window_minutes: i64,
    pub mode: Mode,
    pub limit: usize,
}

impl FilterParams {
    pub fn alerts() -> Self {
        Self {
            window_minutes: ALERT_WINDOW_MINUTES,
            mode: Mode::Major,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn preview(limit: usize) -> Self {
        Self {
            window_minutes: PREVIEW_WINDOW_MINUTES,
            mode: Mode::Major,
            limit,
        }
    }

    pub fn clamped_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT)
    }
}

/// Country allow-list and lowercased keyword list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRules {
    pub countries: Vec<Country>,
    keywords: Vec<String>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            countries: DEFAULT_COUNTRIES.to_vec(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl FilterRules {
    pub fn with_keywords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        self
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn allows_country(&self, c: Country) -> bool {
        self.countries.contains(&c)
    }

    pub fn matches_keyword(&self, title: &str) -> bool {
        let t = title.to_lowercase();
        self.keywords.iter().any(|k| t.contains(k.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Distinct events after the merge, before any filter.
    pub merged_total: usize,
    pub events: Vec<EconomicEvent>,
}

/// Manual rows first, provider rows after; the first row for a given
/// identity wins, so an operator entry overrides the provider's copy.
pub fn merge(manual: Vec<EconomicEvent>, provider: Vec<EconomicEvent>) -> Vec<EconomicEvent> {
    let mut seen = HashSet::new();
    manual
        .into_iter()
        .chain(provider)
        .filter(|e| seen.insert(e.identity()))
        .collect()
}

/// Upper edge of a window starting at `now`. The width is clamped to
/// `[0, MAX_WINDOW_MINUTES]`; past chrono's range the result saturates.
pub fn window_end(now: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    let width = ChronoDuration::minutes(window_minutes.clamp(0, MAX_WINDOW_MINUTES));
    now.checked_add_signed(width).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `[now, now + window]`, both ends inclusive.
pub fn in_window(e: &EconomicEvent, now: DateTime<Utc>, window_minutes: i64) -> bool {
    e.scheduled_at >= now && e.scheduled_at <= window_end(now, window_minutes)
}

pub fn select(
    now: DateTime<Utc>,
    manual: Vec<EconomicEvent>,
    provider: Vec<EconomicEvent>,
    params: &FilterParams,
    rules: &FilterRules,
) -> Selection {
    let merged = merge(manual, provider);
    let merged_total = merged.len();

    let mut events: Vec<EconomicEvent> = merged
        .into_iter()
        .filter(|e| in_window(e, now, params.window_minutes))
        .filter(|e| rules.allows_country(e.country))
        .filter(|e| params.mode == Mode::All || rules.matches_keyword(&e.title))
        .collect();

    events.sort_by_key(|e| e.scheduled_at);
    events.truncate(params.clamped_limit());

    Selection {
        merged_total,
        events,
    }
}

/// Remove events that already carry a live global sent marker. Returns the
/// remaining events and how many were dropped. Per-subscriber markers are
/// checked pair by pair in the dispatcher instead.
pub async fn drop_already_sent(
    store: &EventStore,
    events: Vec<EconomicEvent>,
    scope: DedupeScope,
) -> (Vec<EconomicEvent>, usize) {
    if scope == DedupeScope::Subscriber {
        return (events, 0);
    }
    let mut keep = Vec::with_capacity(events.len());
    let mut dropped = 0usize;
    for e in events {
        if store.is_deduped(&sent_marker_key(&e, None)).await {
            dropped += 1;
            continue;
        }
        keep.push(e);
    }
    (keep, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 12, 12, 0, 0).unwrap()
    }

    fn ev(country: Country, title: &str, minutes_from_now: i64) -> EconomicEvent {
        EconomicEvent::new(country, title, now() + ChronoDuration::minutes(minutes_from_now))
    }

    #[test]
    fn manual_row_overrides_provider_copy() {
        let manual = vec![ev(Country::UnitedStates, "Core CPI y/y", 30).with_figures(Some("0.3%"), None)];
        let provider = vec![
            ev(Country::UnitedStates, "core cpi y/y", 30),
            ev(Country::UnitedStates, "Nonfarm Payrolls", 45),
        ];
        let merged = merge(manual, provider);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].forecast.as_deref(), Some("0.3%"));
    }

    #[test]
    fn sorted_and_truncated() {
        let events = vec![
            ev(Country::UnitedStates, "GDP q/q", 50),
            ev(Country::Japan, "BoJ Rate Decision", 10),
            ev(Country::China, "PMI", 30),
        ];
        let params = FilterParams {
            limit: 2,
            ..FilterParams::alerts()
        };
        let sel = select(now(), events, Vec::new(), &params, &FilterRules::default());
        assert_eq!(sel.merged_total, 3);
        let titles: Vec<_> = sel.events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["BoJ Rate Decision", "PMI"]);
    }

    #[test]
    fn past_events_are_outside_the_window() {
        let events = vec![ev(Country::UnitedStates, "CPI m/m", -1)];
        let sel = select(now(), events, Vec::new(), &FilterParams::alerts(), &FilterRules::default());
        assert!(sel.events.is_empty());
    }

    #[test]
    fn window_upper_bound_is_closed() {
        let at_edge = EconomicEvent::new(Country::UnitedStates, "CPI m/m", now() + ChronoDuration::minutes(60));
        let past_edge = EconomicEvent::new(
            Country::UnitedStates,
            "PPI m/m",
            now() + ChronoDuration::minutes(60) + ChronoDuration::milliseconds(1),
        );
        let at_now = EconomicEvent::new(Country::UnitedStates, "GDP q/q", now());
        let sel = select(
            now(),
            Vec::new(),
            vec![past_edge, at_edge, at_now],
            &FilterParams::alerts(),
            &FilterRules::default(),
        );
        let titles: Vec<_> = sel.events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["GDP q/q", "CPI m/m"]);
    }

    #[test]
    fn keywords_only_matter_in_major_mode() {
        let events = || {
            vec![
                ev(Country::UnitedStates, "Retail Sales m/m", 10),
                ev(Country::UnitedStates, "Core CPI y/y", 20),
            ]
        };
        let rules = FilterRules::default();
        let major = select(now(), Vec::new(), events(), &FilterParams::alerts(), &rules);
        assert_eq!(major.events.len(), 1);
        assert_eq!(major.events[0].title, "Core CPI y/y");

        let all = FilterParams {
            mode: Mode::All,
            ..FilterParams::alerts()
        };
        assert_eq!(select(now(), Vec::new(), events(), &all, &rules).events.len(), 2);
    }

    #[test]
    fn country_allow_list_holds_in_both_modes() {
        let rules = FilterRules::default();
        for mode in [Mode::Major, Mode::All] {
            let params = FilterParams {
                mode,
                ..FilterParams::alerts()
            };
            let sel = select(
                now(),
                vec![ev(Country::Brazil, "Inflation Rate YoY", 15)],
                Vec::new(),
                &params,
                &rules,
            );
            assert!(sel.events.is_empty(), "{mode:?}");
            assert_eq!(sel.merged_total, 1);
        }
    }

    #[tokio::test]
    async fn already_sent_events_are_dropped_in_global_scope() {
        let (store, _) = EventStore::in_memory();
        let sent = ev(Country::UnitedStates, "Core CPI y/y", 20);
        let fresh = ev(Country::Japan, "BoJ Rate Decision", 30);
        store
            .mark_deduped(&sent_marker_key(&sent, None), crate::store::DEFAULT_DEDUPE_TTL)
            .await;

        let (kept, dropped) =
            drop_already_sent(&store, vec![sent.clone(), fresh.clone()], DedupeScope::Global).await;
        assert_eq!(kept, vec![fresh]);
        assert_eq!(dropped, 1);

        let (kept, dropped) = drop_already_sent(&store, vec![sent], DedupeScope::Subscriber).await;
        assert_eq!((kept.len(), dropped), (1, 0));
    }

    #[test]
    fn oversized_window_is_clamped_not_overflowed() {
        assert_eq!(
            window_end(now(), i64::MAX),
            now() + ChronoDuration::minutes(MAX_WINDOW_MINUTES)
        );
        assert_eq!(window_end(now(), -5), now());
        assert_eq!(
            window_end(DateTime::<Utc>::MAX_UTC, 60),
            DateTime::<Utc>::MAX_UTC
        );

        let far = ev(Country::UnitedStates, "CPI y/y", 60 * 24 * 30);
        assert!(in_window(&far, now(), i64::MAX));
    }

    #[test]
    fn zero_limit_still_yields_one() {
        let params = FilterParams {
            limit: 0,
            ..FilterParams::alerts()
        };
        assert_eq!(params.clamped_limit(), 1);
    }

    #[test]
    fn mode_parse() {
        assert_eq!(Mode::parse("ALL"), Some(Mode::All));
        assert_eq!(Mode::parse("major"), Some(Mode::Major));
        assert_eq!(Mode::parse("whatever"), None);
    }
}
