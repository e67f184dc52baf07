use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{get_text, normalize_rows, CalendarProvider};
use crate::event::{parse_timestamp, value_to_text, Country, EconomicEvent, Importance};

const NAME: &str = "fmp";

/// Financial Modeling Prep `economic_calendar`: ISO country codes, naive UTC
/// timestamps, impact as a word, figures as bare numbers.
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    event: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    estimate: Option<serde_json::Value>,
    #[serde(default)]
    previous: Option<serde_json::Value>,
    #[serde(default)]
    impact: Option<String>,
}

pub struct FmpProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        base_url: String,
        api_key: String,
    },
}

impl FmpProvider {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn from_http(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            mode: Mode::Http {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: api_key.to_string(),
            },
        }
    }

    pub fn parse_body(body: &str) -> Result<Vec<EconomicEvent>> {
        let rows: Vec<Row> = serde_json::from_str(body).context("parsing fmp calendar json")?;
        Ok(normalize_rows(NAME, rows, |r| {
            let title = r.event.trim();
            if title.is_empty() {
                return None;
            }
            let mut ev = EconomicEvent::new(
                Country::normalize(&r.country)?,
                title,
                parse_timestamp(&r.date)?,
            );
            ev.forecast = r.estimate.as_ref().and_then(value_to_text);
            ev.previous = r.previous.as_ref().and_then(value_to_text);
            ev.importance = r.impact.as_deref().and_then(Importance::normalize);
            Some(ev)
        }))
    }
}

#[async_trait]
impl CalendarProvider for FmpProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<EconomicEvent>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_body(s),
            Mode::Http {
                client,
                base_url,
                api_key,
            } => {
                let url = format!(
                    "{base_url}/api/v3/economic_calendar?from={}&to={}&apikey={api_key}",
                    from.format("%Y-%m-%d"),
                    to.format("%Y-%m-%d"),
                );
                let body = get_text(client, &url).await.context("fmp fetch")?;
                Self::parse_body(&body)
            }
        }
    }
}
