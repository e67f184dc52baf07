//! Event Store Adapter: typed operations over a `KvBackend`.
//!
//! Reads never fail from the caller's point of view: a backend error is
//! logged, counted and turned into the empty value, so a store hiccup
//! degrades the pipeline to "send nothing" instead of a failed cron tick.
//! Operator-initiated writes (subscribe, insert) still return `Result` so the
//! HTTP layer can report them.

pub mod backend;
pub mod memory;
pub mod redis_backend;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use backend::KvBackend;
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

use crate::event::{
    minute_key, normalize_title, parse_timestamp, Country, EconomicEvent, Importance, RawEvent,
};
use crate::subscriber::SubscriberId;

pub const SUBSCRIBERS_KEY: &str = "subscribers";
pub const SUBSCRIBER_NAMES_KEY: &str = "subscriber:names";
pub const MANUAL_EVENTS_KEY: &str = "manual_events";
pub const UPCOMING_CACHE_KEY: &str = "cache:upcoming";

pub const MANUAL_RETENTION_DAYS: i64 = 90;
pub const DEFAULT_DEDUPE_TTL: Duration = Duration::from_secs(48 * 3600);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

const ENVELOPE_VERSION: u8 = 1;

/// Whether a sent marker covers everyone or a single chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupeScope {
    #[default]
    Global,
    Subscriber,
}

impl DedupeScope {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "global" => Some(Self::Global),
            "subscriber" | "per-subscriber" | "per_subscriber" => Some(Self::Subscriber),
            _ => None,
        }
    }
}

/// `sent:US:2025-03-12T12:30:core cpi y/y`, or with the chat id in front of
/// the country for per-subscriber markers.
pub fn sent_marker_key(event: &EconomicEvent, subscriber: Option<&SubscriberId>) -> String {
    let tail = format!(
        "{}:{}:{}",
        event.country.code(),
        minute_key(event.scheduled_at),
        normalize_title(&event.title)
    );
    match subscriber {
        Some(id) => format!("sent:{}:{}", id.as_str(), tail),
        None => format!("sent:{tail}"),
    }
}

/// Last computed "next events" list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingCache {
    pub computed_at: DateTime<Utc>,
    pub events: Vec<EconomicEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsertReport {
    pub accepted: usize,
    pub pruned: u64,
    pub rejected: Vec<Rejection>,
}

/// Serialized form of a manual event inside the sorted set.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u8,
    country: String,
    event: String,
    date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    forecast: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    importance: Option<Importance>,
}

fn encode(ev: &EconomicEvent) -> Result<String> {
    let env = Envelope {
        v: ENVELOPE_VERSION,
        country: ev.country.code().to_string(),
        event: ev.title.clone(),
        date: ev.scheduled_at.to_rfc3339(),
        forecast: ev.forecast.clone(),
        previous: ev.previous.clone(),
        importance: ev.importance,
    };
    serde_json::to_string(&env).context("encode manual event")
}

fn decode(raw: &str) -> Option<EconomicEvent> {
    let env: Envelope = match serde_json::from_str(raw) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(target: "store", error = %e, "dropping undecodable manual event");
            return None;
        }
    };
    if env.v != ENVELOPE_VERSION {
        tracing::debug!(target: "store", version = env.v, "dropping manual event with unknown version");
        return None;
    }
    Some(EconomicEvent {
        country: Country::normalize(&env.country)?,
        title: env.event,
        scheduled_at: parse_timestamp(&env.date)?,
        forecast: env.forecast,
        previous: env.previous,
        importance: env.importance,
    })
}

fn store_error(op: &'static str, e: &anyhow::Error) {
    tracing::warn!(target: "store", op, error = %format!("{e:#}"), "store call failed");
    counter!("calendar_store_errors_total").increment(1);
}

#[derive(Clone)]
pub struct EventStore {
    backend: Arc<dyn KvBackend>,
}

impl EventStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> (Self, Arc<MemoryBackend>) {
        let mem = Arc::new(MemoryBackend::new());
        (Self::new(mem.clone()), mem)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // ---- subscribers ----

    /// Valid subscriber ids, sorted. Members that fail validation are skipped;
    /// `purge_invalid_subscribers` removes them for good.
    pub async fn list_subscribers(&self) -> Vec<SubscriberId> {
        let members = match self.backend.smembers(SUBSCRIBERS_KEY).await {
            Ok(m) => m,
            Err(e) => {
                store_error("list_subscribers", &e);
                return Vec::new();
            }
        };
        let mut ids: Vec<SubscriberId> = members
            .iter()
            .filter_map(|m| match SubscriberId::parse(m) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(target: "store", member = %m, error = %e, "skipping invalid subscriber");
                    None
                }
            })
            .collect();
        ids.sort();
        ids
    }

    pub async fn subscriber_count(&self) -> u64 {
        match self.backend.scard(SUBSCRIBERS_KEY).await {
            Ok(n) => n,
            Err(e) => {
                store_error("subscriber_count", &e);
                0
            }
        }
    }

    /// Idempotent. Returns the re-read subscriber count.
    pub async fn add_subscriber(&self, id: &SubscriberId, display_name: Option<&str>) -> Result<u64> {
        self.backend
            .sadd(SUBSCRIBERS_KEY, id.as_str())
            .await
            .context("add subscriber")?;
        if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
            if let Err(e) = self.backend.hset(SUBSCRIBER_NAMES_KEY, id.as_str(), name).await {
                store_error("set_subscriber_name", &e);
            }
        }
        Ok(self.subscriber_count().await)
    }

    /// Idempotent. Returns the re-read subscriber count.
    pub async fn remove_subscriber(&self, id: &SubscriberId) -> Result<u64> {
        self.backend
            .srem(SUBSCRIBERS_KEY, id.as_str())
            .await
            .context("remove subscriber")?;
        if let Err(e) = self.backend.hdel(SUBSCRIBER_NAMES_KEY, id.as_str()).await {
            store_error("remove_subscriber_name", &e);
        }
        Ok(self.subscriber_count().await)
    }

    pub async fn subscriber_name(&self, id: &SubscriberId) -> Option<String> {
        match self.backend.hget(SUBSCRIBER_NAMES_KEY, id.as_str()).await {
            Ok(v) => v,
            Err(e) => {
                store_error("subscriber_name", &e);
                None
            }
        }
    }

    /// Remove members that are not numeric chat ids (leftover template values
    /// and the like). Returns how many were removed.
    pub async fn purge_invalid_subscribers(&self) -> Result<usize> {
        let members = self
            .backend
            .smembers(SUBSCRIBERS_KEY)
            .await
            .context("list subscribers for cleanup")?;
        let mut removed = 0usize;
        for m in members.iter().filter(|m| SubscriberId::parse(m).is_err()) {
            self.backend
                .srem(SUBSCRIBERS_KEY, m)
                .await
                .context("remove invalid subscriber")?;
            if let Err(e) = self.backend.hdel(SUBSCRIBER_NAMES_KEY, m).await {
                store_error("purge_subscriber_name", &e);
            }
            tracing::info!(target: "store", member = %m, "purged invalid subscriber");
            removed += 1;
        }
        Ok(removed)
    }

    // ---- manual events ----

    /// Manual events scheduled within `[from, to]`, ascending.
    ///
    /// Tries a score-range query first; if the store refuses it, fetches the
    /// whole set and filters here. Either way the result is re-filtered and
    /// sorted because stores do not agree on ordering.
    pub async fn list_manual_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<EconomicEvent> {
        let (lo, hi) = (from.timestamp_millis(), to.timestamp_millis());
        let raw = match self.backend.zrangebyscore(MANUAL_EVENTS_KEY, lo, hi).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "store", error = %format!("{e:#}"), "range query failed, falling back to full scan");
                match self.backend.zrange_all(MANUAL_EVENTS_KEY).await {
                    Ok(v) => v,
                    Err(e) => {
                        store_error("list_manual_events", &e);
                        return Vec::new();
                    }
                }
            }
        };

        let mut events: Vec<EconomicEvent> = raw
            .iter()
            .filter_map(|s| decode(s))
            .filter(|e| e.scheduled_at >= from && e.scheduled_at <= to)
            .collect();
        events.sort_by_key(|e| e.scheduled_at);
        events
    }

    pub async fn insert_manual_events(&self, candidates: Vec<RawEvent>) -> Result<InsertReport> {
        self.insert_manual_events_at(candidates, Utc::now()).await
    }

    /// Validate, prune entries older than the retention horizon, then store
    /// the valid subset keyed by scheduled time. Nothing is written when no
    /// candidate validates.
    pub async fn insert_manual_events_at(
        &self,
        candidates: Vec<RawEvent>,
        now: DateTime<Utc>,
    ) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        let mut valid = Vec::with_capacity(candidates.len());
        for (index, raw) in candidates.into_iter().enumerate() {
            match raw.into_event() {
                Ok(ev) => valid.push(ev),
                Err(e) => report.rejected.push(Rejection {
                    index,
                    reason: e.to_string(),
                }),
            }
        }
        if valid.is_empty() {
            return Ok(report);
        }

        let cutoff = now - ChronoDuration::days(MANUAL_RETENTION_DAYS);
        match self
            .backend
            .zremrangebyscore(MANUAL_EVENTS_KEY, i64::MIN, cutoff.timestamp_millis() - 1)
            .await
        {
            Ok(n) => report.pruned = n,
            Err(e) => store_error("prune_manual_events", &e),
        }

        for ev in &valid {
            let member = encode(ev)?;
            self.backend
                .zadd(MANUAL_EVENTS_KEY, &member, ev.scheduled_at.timestamp_millis())
                .await
                .context("insert manual event")?;
        }
        report.accepted = valid.len();
        tracing::info!(
            target: "store",
            accepted = report.accepted,
            rejected = report.rejected.len(),
            pruned = report.pruned,
            "manual events stored"
        );
        Ok(report)
    }

    // ---- upcoming cache ----

    pub async fn get_cache(&self) -> Option<UpcomingCache> {
        let raw = match self.backend.get(UPCOMING_CACHE_KEY).await {
            Ok(v) => v?,
            Err(e) => {
                store_error("get_cache", &e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(target: "store", error = %e, "ignoring undecodable upcoming cache");
                None
            }
        }
    }

    pub async fn set_cache(&self, record: &UpcomingCache, ttl: Duration) {
        let body = match serde_json::to_string(record) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(target: "store", error = %e, "could not encode upcoming cache");
                return;
            }
        };
        if let Err(e) = self.backend.set_ex(UPCOMING_CACHE_KEY, &body, ttl).await {
            store_error("set_cache", &e);
        }
    }

    // ---- dedupe markers ----

    pub async fn is_deduped(&self, key: &str) -> bool {
        match self.backend.exists(key).await {
            Ok(v) => v,
            Err(e) => {
                store_error("is_deduped", &e);
                false
            }
        }
    }

    /// Returns whether the marker was written.
    pub async fn mark_deduped(&self, key: &str, ttl: Duration) -> bool {
        match self.backend.set_ex(key, "1", ttl).await {
            Ok(()) => true,
            Err(e) => {
                store_error("mark_deduped", &e);
                false
            }
        }
    }
}
