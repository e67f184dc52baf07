// tests/common/mod.rs
// In-memory wiring shared by the integration tests: memory store, fixture
// provider, recording sender.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use calendar_alert_bot::event::EconomicEvent;
use calendar_alert_bot::filter::FilterRules;
use calendar_alert_bot::notify::RecordingSender;
use calendar_alert_bot::providers::{ProviderChain, StaticProvider};
use calendar_alert_bot::store::{EventStore, MemoryBackend};
use calendar_alert_bot::{AppState, Config};

pub const SECRET: &str = "s3cret";

pub struct Harness {
    pub state: AppState,
    pub mem: Arc<MemoryBackend>,
    pub sender: Arc<RecordingSender>,
    pub provider: Arc<StaticProvider>,
}

pub fn config() -> Config {
    Config {
        admin_secret: Some(SECRET.to_string()),
        ..Config::default()
    }
}

pub fn harness(provider_events: Vec<EconomicEvent>) -> Harness {
    harness_with(config(), provider_events)
}

pub fn harness_with(config: Config, provider_events: Vec<EconomicEvent>) -> Harness {
    let (store, mem) = EventStore::in_memory();
    let sender = Arc::new(RecordingSender::new());
    let provider = Arc::new(StaticProvider::new("fixture", provider_events));
    let chain = ProviderChain::new(
        vec![Box::new(provider.clone())],
        Duration::from_secs(2),
        Duration::ZERO,
    );
    let state = AppState::new(config, store, chain, sender.clone(), FilterRules::default());
    Harness {
        state,
        mem,
        sender,
        provider,
    }
}
