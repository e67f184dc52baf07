//! Dry-run demo: one subscriber, a fixture provider and a manual event, all
//! in memory. Prints the pipeline report and the rendered previews.

use chrono::{Duration, Utc};
use std::sync::Arc;

use calendar_alert_bot::event::{Country, EconomicEvent, RawEvent};
use calendar_alert_bot::filter::FilterRules;
use calendar_alert_bot::notify::RecordingSender;
use calendar_alert_bot::pipeline::{run_alerts, AlertParams};
use calendar_alert_bot::providers::{ProviderChain, StaticProvider};
use calendar_alert_bot::store::EventStore;
use calendar_alert_bot::subscriber::SubscriberId;
use calendar_alert_bot::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let now = Utc::now();

    let (store, _) = EventStore::in_memory();
    store
        .add_subscriber(&SubscriberId::parse("123456789")?, Some("demo"))
        .await?;
    store
        .insert_manual_events(vec![RawEvent {
            country: "United States".into(),
            event: "Core CPI y/y".into(),
            date: (now + Duration::minutes(30)).to_rfc3339(),
            forecast: Some("0.3%".into()),
            previous: Some("0.2%".into()),
            impact: Some("High".into()),
        }])
        .await?;

    let provider = StaticProvider::new(
        "fixture",
        vec![
            EconomicEvent::new(Country::EuroArea, "ECB Interest Rate Decision", now + Duration::minutes(45)),
            EconomicEvent::new(Country::UnitedStates, "Retail Sales m/m", now + Duration::minutes(50)),
            EconomicEvent::new(Country::Brazil, "Inflation Rate YoY", now + Duration::minutes(20)),
        ],
    );
    let chain = ProviderChain::new(
        vec![Box::new(provider)],
        std::time::Duration::from_secs(2),
        std::time::Duration::ZERO,
    );

    let state = AppState::new(
        Config::default(),
        store,
        chain,
        Arc::new(RecordingSender::new()),
        FilterRules::default(),
    );

    let params = AlertParams {
        dry_run: true,
        ..AlertParams::default()
    };
    let report = run_alerts(&state, params, now).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    for p in &report.previews {
        println!("----\n{p}");
    }
    Ok(())
}
