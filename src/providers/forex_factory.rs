use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{get_text, normalize_rows, CalendarProvider};
use crate::event::{clean_text, parse_timestamp, Country, EconomicEvent, Importance};

const NAME: &str = "forexfactory";

pub const DEFAULT_FF_CALENDAR_URL: &str = "https://nfs.faireconomy.media/ff_calendar_thisweek.json";

/// Forex Factory weekly feed: currency codes instead of countries, local
/// timestamps with an explicit offset. The feed ignores the requested range,
/// so rows are clipped here.
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    title: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    forecast: Option<String>,
    #[serde(default)]
    previous: Option<String>,
}

pub struct ForexFactoryProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client, url: String },
}

impl ForexFactoryProvider {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn from_http(client: reqwest::Client, url: &str) -> Self {
        Self {
            mode: Mode::Http {
                client,
                url: url.to_string(),
            },
        }
    }

    pub fn parse_body(body: &str) -> Result<Vec<EconomicEvent>> {
        let rows: Vec<Row> = serde_json::from_str(body).context("parsing forexfactory json")?;
        Ok(normalize_rows(NAME, rows, |r| {
            let title = r.title.trim();
            if title.is_empty() {
                return None;
            }
            let mut ev = EconomicEvent::new(
                Country::normalize(&r.country)?,
                title,
                parse_timestamp(&r.date)?,
            );
            ev.forecast = clean_text(r.forecast);
            ev.previous = clean_text(r.previous);
            ev.importance = r.impact.as_deref().and_then(Importance::normalize);
            Some(ev)
        }))
    }
}

#[async_trait]
impl CalendarProvider for ForexFactoryProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<EconomicEvent>> {
        let events = match &self.mode {
            Mode::Fixture(s) => Self::parse_body(s)?,
            Mode::Http { client, url } => {
                let body = get_text(client, url).await.context("forexfactory fetch")?;
                Self::parse_body(&body)?
            }
        };
        Ok(events
            .into_iter()
            .filter(|e| e.scheduled_at >= from && e.scheduled_at <= to)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"[
        {"title":"Core CPI m/m","country":"USD","date":"2025-03-12T08:30:00-04:00","impact":"High","forecast":"0.3%","previous":"0.4%"},
        {"title":"Bank Holiday","country":"JPY","date":"2025-03-20T00:00:00+09:00","impact":"Holiday","forecast":"","previous":""},
        {"title":"Something","country":"ALL","date":"2025-03-12T10:00:00-04:00","impact":"Low"}
    ]"#;

    #[tokio::test]
    async fn currency_codes_map_and_range_is_clipped() {
        let p = ForexFactoryProvider::from_fixture(FEED);
        let from = Utc.with_ymd_and_hms(2025, 3, 12, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 3, 13, 0, 0, 0).unwrap();
        let got = p.fetch(from, to).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].country, Country::UnitedStates);
        assert_eq!(got[0].scheduled_at, Utc.with_ymd_and_hms(2025, 3, 12, 12, 30, 0).unwrap());
        assert_eq!(got[0].importance, Some(Importance::High));
    }

    #[test]
    fn blank_figures_become_none() {
        let got = ForexFactoryProvider::parse_body(FEED).unwrap();
        let holiday = got.iter().find(|e| e.title == "Bank Holiday").unwrap();
        assert!(holiday.forecast.is_none());
        assert!(holiday.importance.is_none());
    }
}
