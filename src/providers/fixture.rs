use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::CalendarProvider;
use crate::event::EconomicEvent;

/// Serves a fixed list of events. Used by tests and the preview demo; counts
/// calls so tests can assert a fetch never happened.
pub struct StaticProvider {
    name: &'static str,
    events: Vec<EconomicEvent>,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(name: &'static str, events: Vec<EconomicEvent>) -> Self {
        Self {
            name,
            events,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarProvider for StaticProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<EconomicEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .events
            .iter()
            .filter(|e| e.scheduled_at >= from && e.scheduled_at <= to)
            .cloned()
            .collect())
    }
}
