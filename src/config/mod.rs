//! Runtime configuration from environment variables (`.env` is loaded by the
//! entrypoint). Everything has a default so the service boots with an
//! in-memory store and no providers for local experiments.

pub mod filters;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::providers::forex_factory::DEFAULT_FF_CALENDAR_URL;
use crate::store::{DedupeScope, DEFAULT_CACHE_TTL, DEFAULT_DEDUPE_TTL};

pub const DEFAULT_FMP_BASE_URL: &str = "https://financialmodelingprep.com";
pub const DEFAULT_TE_BASE_URL: &str = "https://api.tradingeconomics.com";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub telegram_token: Option<String>,
    pub telegram_api_base: String,
    pub telegram_timeout: Duration,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls.
    pub webhook_secret: Option<String>,

    /// Bearer secret for cron and admin endpoints. `None` rejects them all.
    pub admin_secret: Option<String>,

    // Store
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub dedupe_ttl: Duration,
    pub dedupe_scope: DedupeScope,

    // Providers
    pub fmp_api_key: Option<String>,
    pub fmp_base_url: String,
    pub te_api_key: Option<String>,
    pub te_base_url: String,
    pub ff_enabled: bool,
    pub ff_calendar_url: String,
    pub provider_timeout: Duration,
    pub provider_min_interval: Duration,

    /// How often the external scheduler calls the trigger; shown by /status.
    pub poll_interval_minutes: u64,
    /// In-process ticker period; `None` leaves scheduling to an external cron.
    pub alert_tick: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build from any key lookup; tests pass a closure over a map instead of
    /// mutating the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let text = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let num = |k: &str, default: u64| parse_or(text(k), default);

        let dedupe_scope = text("DEDUPE_SCOPE")
            .and_then(|s| {
                let parsed = DedupeScope::parse(&s);
                if parsed.is_none() {
                    tracing::warn!(value = %s, "unknown DEDUPE_SCOPE, using global");
                }
                parsed
            })
            .unwrap_or_default();

        let alert_tick = match num("ALERT_TICK_SECS", 0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            telegram_token: text("TELEGRAM_BOT_TOKEN"),
            telegram_api_base: text("TELEGRAM_API_BASE")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            telegram_timeout: Duration::from_secs(num("TELEGRAM_TIMEOUT_SECS", 5)),
            webhook_secret: text("TELEGRAM_WEBHOOK_SECRET"),
            admin_secret: text("ADMIN_SECRET").or_else(|| text("CRON_SECRET")),
            redis_url: text("REDIS_URL"),
            cache_ttl: Duration::from_secs(num("CACHE_TTL_SECS", DEFAULT_CACHE_TTL.as_secs())),
            dedupe_ttl: Duration::from_secs(
                num("DEDUPE_TTL_HOURS", DEFAULT_DEDUPE_TTL.as_secs() / 3600).saturating_mul(3600),
            ),
            dedupe_scope,
            fmp_api_key: text("FMP_API_KEY"),
            fmp_base_url: text("FMP_BASE_URL").unwrap_or_else(|| DEFAULT_FMP_BASE_URL.to_string()),
            te_api_key: text("TE_API_KEY"),
            te_base_url: text("TE_BASE_URL").unwrap_or_else(|| DEFAULT_TE_BASE_URL.to_string()),
            ff_enabled: text("FF_ENABLED").is_some_and(|v| is_truthy(&v)),
            ff_calendar_url: text("FF_CALENDAR_URL")
                .unwrap_or_else(|| DEFAULT_FF_CALENDAR_URL.to_string()),
            provider_timeout: Duration::from_secs(num("PROVIDER_TIMEOUT_SECS", 8).max(1)),
            provider_min_interval: Duration::from_millis(num("PROVIDER_MIN_INTERVAL_MS", 1_000)),
            poll_interval_minutes: num("POLL_INTERVAL_MINUTES", 5),
            alert_tick,
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// `1`, `true`, `yes`, `on` (any case).
pub fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
