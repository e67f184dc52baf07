use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{get_text, normalize_rows, CalendarProvider};
use crate::event::{parse_timestamp, value_to_text, Country, EconomicEvent, Importance};

const NAME: &str = "tradingeconomics";

/// Trading Economics calendar rows: English country names, importance as
/// 1..=3, `TEForecast` used when the consensus forecast is blank.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Row {
    #[serde(default)]
    country: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    forecast: Option<serde_json::Value>,
    #[serde(default, rename = "TEForecast")]
    te_forecast: Option<serde_json::Value>,
    #[serde(default)]
    previous: Option<serde_json::Value>,
    #[serde(default)]
    importance: Option<i64>,
}

pub struct TradingEconomicsProvider {
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

impl TradingEconomicsProvider {
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
        let rows: Vec<Row> =
            serde_json::from_str(body).context("parsing tradingeconomics calendar json")?;
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
            ev.forecast = r
                .forecast
                .as_ref()
                .and_then(value_to_text)
                .or_else(|| r.te_forecast.as_ref().and_then(value_to_text));
            ev.previous = r.previous.as_ref().and_then(value_to_text);
            ev.importance = r.importance.and_then(Importance::from_level);
            Some(ev)
        }))
    }
}

#[async_trait]
impl CalendarProvider for TradingEconomicsProvider {
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
                    "{base_url}/calendar/country/All/{}/{}?c={api_key}&f=json",
                    from.format("%Y-%m-%d"),
                    to.format("%Y-%m-%d"),
                );
                let body = get_text(client, &url)
                    .await
                    .context("tradingeconomics fetch")?;
                Self::parse_body(&body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn te_forecast_fills_blank_consensus() {
        let body = r#"[
            {"Country":"Euro Area","Event":"ECB Interest Rate Decision","Date":"2025-03-06T13:15:00","Forecast":"","TEForecast":"2.65%","Previous":"2.9%","Importance":3},
            {"Country":"Brazil","Event":"Inflation Rate YoY","Date":"2025-03-12T12:00:00","Importance":2},
            {"Country":"Narnia","Event":"GDP","Date":"2025-03-12T12:00:00","Importance":1}
        ]"#;
        let got = TradingEconomicsProvider::parse_body(body).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].country, Country::EuroArea);
        assert_eq!(got[0].forecast.as_deref(), Some("2.65%"));
        assert_eq!(got[0].importance, Some(Importance::High));
        assert_eq!(got[1].country, Country::Brazil);
    }
}
