//! Provider Adapter: upstream calendar APIs behind one trait, walked in a
//! fixed priority order. The first provider that yields usable events wins;
//! a timeout, non-2xx answer or malformed body only means "this provider
//! produced nothing".

pub mod fixture;
pub mod fmp;
pub mod forex_factory;
pub mod trading_economics;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::Config;
use crate::event::EconomicEvent;

pub use fixture::StaticProvider;
pub use fmp::FmpProvider;
pub use forex_factory::ForexFactoryProvider;
pub use trading_economics::TradingEconomicsProvider;

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<EconomicEvent>>;
}

#[async_trait]
impl<P: CalendarProvider + ?Sized> CalendarProvider for std::sync::Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    async fn fetch(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<EconomicEvent>> {
        (**self).fetch(from, to).await
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "calendar_provider_errors_total",
            "Provider fetch/parse errors and timeouts."
        );
        describe_counter!(
            "calendar_provider_events_total",
            "Normalized events returned by the winning provider."
        );
        describe_histogram!("calendar_provider_fetch_ms", "Provider round trip in milliseconds.");
    });
}

/// Single-writer gate spacing upstream calls at least `min_interval` apart.
/// Owned by the chain, so each deployment worker has its own gate.
pub struct RateGate {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Wait until the previous call is at least `min_interval` old, then
    /// claim the slot. Callers queue on the lock in arrival order.
    pub async fn await_turn(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.min_interval;
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// What one fetch produced and who produced it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProviderFetch {
    pub events: Vec<EconomicEvent>,
    pub source: Option<&'static str>,
    pub errors: Vec<String>,
}

pub struct ProviderChain {
    providers: Vec<Box<dyn CalendarProvider>>,
    gate: RateGate,
    timeout: Duration,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn CalendarProvider>>, timeout: Duration, min_interval: Duration) -> Self {
        ensure_metrics_described();
        Self {
            providers,
            gate: RateGate::new(min_interval),
            timeout,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::from_secs(8), Duration::ZERO)
    }

    /// Configured providers in priority order: FMP, Trading Economics,
    /// Forex Factory. Providers without credentials are left out.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let client = http_client(cfg.provider_timeout)?;
        let mut providers: Vec<Box<dyn CalendarProvider>> = Vec::new();
        if let Some(key) = &cfg.fmp_api_key {
            providers.push(Box::new(FmpProvider::from_http(
                client.clone(),
                &cfg.fmp_base_url,
                key,
            )));
        }
        if let Some(key) = &cfg.te_api_key {
            providers.push(Box::new(TradingEconomicsProvider::from_http(
                client.clone(),
                &cfg.te_base_url,
                key,
            )));
        }
        if cfg.ff_enabled {
            providers.push(Box::new(ForexFactoryProvider::from_http(
                client,
                &cfg.ff_calendar_url,
            )));
        }
        tracing::info!(
            target: "providers",
            configured = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "provider chain ready"
        );
        Ok(Self::new(providers, cfg.provider_timeout, cfg.provider_min_interval))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn fetch_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> ProviderFetch {
        let mut out = ProviderFetch::default();
        for p in &self.providers {
            self.gate.await_turn().await;
            let t0 = std::time::Instant::now();
            let res = tokio::time::timeout(self.timeout, p.fetch(from, to)).await;
            histogram!("calendar_provider_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            let err = match res {
                Ok(Ok(events)) if !events.is_empty() => {
                    tracing::info!(target: "providers", provider = p.name(), events = events.len(), "provider supplied events");
                    counter!("calendar_provider_events_total").increment(events.len() as u64);
                    out.events = events;
                    out.source = Some(p.name());
                    return out;
                }
                Ok(Ok(_)) => {
                    tracing::info!(target: "providers", provider = p.name(), "provider returned no usable events");
                    continue;
                }
                Ok(Err(e)) => format!("{}: {e:#}", p.name()),
                Err(_) => format!("{}: timed out after {}s", p.name(), self.timeout.as_secs()),
            };
            tracing::warn!(target: "providers", provider = p.name(), error = %err, "provider failed");
            counter!("calendar_provider_errors_total").increment(1);
            out.errors.push(err);
        }
        out
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("calendar-alert-bot/0.1")
        .connect_timeout(Duration::from_secs(4).min(timeout))
        .timeout(timeout)
        .build()
        .context("build provider http client")
}

/// GET a URL and return the body of a 2xx response.
pub(crate) async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client.get(url).send().await.context("provider http get")?;
    let resp = resp.error_for_status().context("provider non-2xx")?;
    resp.text().await.context("provider body")
}

/// Map rows one by one; a row that does not normalize is dropped, not the batch.
pub(crate) fn normalize_rows<T>(
    provider: &'static str,
    rows: Vec<T>,
    map: impl Fn(T) -> Option<EconomicEvent>,
) -> Vec<EconomicEvent> {
    let total = rows.len();
    let out: Vec<EconomicEvent> = rows.into_iter().filter_map(map).collect();
    if out.len() < total {
        tracing::debug!(target: "providers", provider, dropped = total - out.len(), "rows dropped during normalization");
    }
    out
}
