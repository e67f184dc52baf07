use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::{render, Lang, MessageSender};
use crate::event::EconomicEvent;
use crate::store::{sent_marker_key, DedupeScope, EventStore};
use crate::subscriber::SubscriberId;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BroadcastReport {
    /// Successful sends, or sends that would happen in a dry run.
    pub sent: usize,
    pub failed: usize,
    pub skipped_deduped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<String>,
}

/// Sends each event to every subscriber and records sent markers.
#[derive(Clone)]
pub struct Dispatcher {
    store: EventStore,
    sender: Arc<dyn MessageSender>,
    scope: DedupeScope,
    ttl: Duration,
}

impl Dispatcher {
    pub fn new(
        store: EventStore,
        sender: Arc<dyn MessageSender>,
        scope: DedupeScope,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            scope,
            ttl,
        }
    }

    /// Events go out in order; within an event, subscribers in order. A failed
    /// send is counted and logged, then the loop moves on. Dry runs render
    /// but never send or write markers.
    pub async fn broadcast(
        &self,
        events: &[EconomicEvent],
        subscribers: &[SubscriberId],
        lang: Lang,
        dry_run: bool,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for ev in events {
            let global_key = sent_marker_key(ev, None);
            if self.scope == DedupeScope::Global && self.store.is_deduped(&global_key).await {
                tracing::debug!(target: "notify", key = %global_key, "already sent, skipping");
                report.skipped_deduped += 1;
                continue;
            }

            let text = render(ev, lang);
            if dry_run {
                report.previews.push(text.clone());
            }

            let mut delivered = 0usize;
            for sub in subscribers {
                let sub_key = (self.scope == DedupeScope::Subscriber)
                    .then(|| sent_marker_key(ev, Some(sub)));
                if let Some(key) = &sub_key {
                    if self.store.is_deduped(key).await {
                        report.skipped_deduped += 1;
                        continue;
                    }
                }
                if dry_run {
                    report.sent += 1;
                    continue;
                }
                match self.sender.send_message(sub.as_str(), &text).await {
                    Ok(()) => {
                        report.sent += 1;
                        delivered += 1;
                        counter!("calendar_alerts_sent_total").increment(1);
                        if let Some(key) = &sub_key {
                            self.store.mark_deduped(key, self.ttl).await;
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        counter!("calendar_send_failures_total").increment(1);
                        tracing::warn!(
                            target: "notify",
                            chat_id = %sub,
                            event = %ev.title,
                            error = %format!("{e:#}"),
                            "send failed"
                        );
                    }
                }
            }

            if !dry_run && self.scope == DedupeScope::Global && delivered > 0 {
                self.store.mark_deduped(&global_key, self.ttl).await;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Country;
    use crate::notify::RecordingSender;
    use crate::store::DEFAULT_DEDUPE_TTL;
    use chrono::{TimeZone, Utc};

    fn ev() -> EconomicEvent {
        EconomicEvent::new(
            Country::UnitedStates,
            "Core CPI y/y",
            Utc.with_ymd_and_hms(2025, 3, 12, 12, 30, 0).unwrap(),
        )
    }

    fn ids(raw: &[&str]) -> Vec<SubscriberId> {
        raw.iter().map(|r| SubscriberId::parse(r).unwrap()).collect()
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let (store, _) = EventStore::in_memory();
        let sender = Arc::new(RecordingSender::new());
        sender.fail_for("2");
        let d = Dispatcher::new(store.clone(), sender.clone(), DedupeScope::Global, DEFAULT_DEDUPE_TTL);

        let r = d.broadcast(&[ev()], &ids(&["1", "2", "3"]), Lang::Both, false).await;
        assert_eq!((r.sent, r.failed), (2, 1));
        assert_eq!(sender.count(), 2);
        assert!(store.is_deduped(&sent_marker_key(&ev(), None)).await);
    }

    #[tokio::test]
    async fn no_marker_when_every_send_fails() {
        let (store, _) = EventStore::in_memory();
        let sender = Arc::new(RecordingSender::new());
        sender.fail_for("1");
        let d = Dispatcher::new(store.clone(), sender, DedupeScope::Global, DEFAULT_DEDUPE_TTL);

        let r = d.broadcast(&[ev()], &ids(&["1"]), Lang::En, false).await;
        assert_eq!((r.sent, r.failed), (0, 1));
        assert!(!store.is_deduped(&sent_marker_key(&ev(), None)).await);
    }

    #[tokio::test]
    async fn dry_run_counts_but_touches_nothing() {
        let (store, _) = EventStore::in_memory();
        let sender = Arc::new(RecordingSender::new());
        let d = Dispatcher::new(store.clone(), sender.clone(), DedupeScope::Global, DEFAULT_DEDUPE_TTL);

        let r = d.broadcast(&[ev()], &ids(&["1", "2"]), Lang::Both, true).await;
        assert_eq!(r.sent, 2);
        assert_eq!(r.previews.len(), 1);
        assert_eq!(sender.count(), 0);
        assert!(!store.is_deduped(&sent_marker_key(&ev(), None)).await);
    }

    #[tokio::test]
    async fn per_subscriber_scope_reaches_late_joiners() {
        let (store, _) = EventStore::in_memory();
        let sender = Arc::new(RecordingSender::new());
        let d = Dispatcher::new(store, sender.clone(), DedupeScope::Subscriber, DEFAULT_DEDUPE_TTL);

        let first = d.broadcast(&[ev()], &ids(&["1"]), Lang::En, false).await;
        assert_eq!(first.sent, 1);

        let second = d.broadcast(&[ev()], &ids(&["1", "2"]), Lang::En, false).await;
        assert_eq!((second.sent, second.skipped_deduped), (1, 1));
        assert_eq!(sender.sent()[1].0, "2");
    }
}
