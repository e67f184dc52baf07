// tests/pipeline_e2e.rs
//
// Alert pipeline end to end over the in-memory store, a fixture provider
// and a recording sender.

mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};

use calendar_alert_bot::event::{Country, EconomicEvent, RawEvent};
use calendar_alert_bot::filter::Mode;
use calendar_alert_bot::notify::Lang;
use calendar_alert_bot::pipeline::{run_alerts, AlertParams, Source};
use calendar_alert_bot::store::{sent_marker_key, DedupeScope};
use calendar_alert_bot::subscriber::SubscriberId;
use calendar_alert_bot::Config;

use common::{config, harness, harness_with};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 12, 12, 0, 0).unwrap()
}

fn id(raw: &str) -> SubscriberId {
    SubscriberId::parse(raw).unwrap()
}

fn cpi_input() -> RawEvent {
    RawEvent {
        country: "United States".into(),
        event: "Core CPI y/y".into(),
        date: (now() + Duration::minutes(30)).to_rfc3339(),
        forecast: Some("0.3%".into()),
        previous: Some("0.2%".into()),
        impact: None,
    }
}

fn params() -> AlertParams {
    AlertParams {
        window_minutes: 60,
        mode: Mode::Major,
        limit: 5,
        lang: Lang::Both,
        dry_run: false,
        source: Source::Provider,
    }
}

#[tokio::test]
async fn subscribe_insert_run_then_rerun_sends_nothing() {
    let h = harness(Vec::new());
    h.state.store.add_subscriber(&id("123456789"), None).await.unwrap();
    h.state
        .store
        .insert_manual_events_at(vec![cpi_input()], now())
        .await
        .unwrap();

    let first = run_alerts(&h.state, params(), now()).await;
    assert_eq!(first.subscribers, 1);
    assert_eq!(first.filtered, 1);
    assert_eq!(first.sent, 1);
    assert_eq!(h.sender.count(), 1);

    let ev = EconomicEvent::new(Country::UnitedStates, "Core CPI y/y", now() + Duration::minutes(30));
    assert!(h.state.store.is_deduped(&sent_marker_key(&ev, None)).await);

    let second = run_alerts(&h.state, params(), now()).await;
    assert_eq!(second.sent, 0);
    assert_eq!(second.skipped_deduped, 1);
    assert_eq!(h.sender.count(), 1);

    let (chat, text) = &h.sender.sent()[0];
    assert_eq!(chat, "123456789");
    assert!(text.contains("Core CPI y/y"));
    assert!(text.contains("0.3%"));
}

#[tokio::test]
async fn dry_run_has_no_side_effects() {
    let h = harness(vec![EconomicEvent::new(
        Country::Japan,
        "BoJ Interest Rate Decision",
        now() + Duration::minutes(10),
    )]);
    h.state.store.add_subscriber(&id("1"), None).await.unwrap();
    h.state.store.add_subscriber(&id("2"), None).await.unwrap();
    h.state
        .store
        .insert_manual_events_at(vec![cpi_input()], now())
        .await
        .unwrap();

    let report = run_alerts(&h.state, AlertParams { dry_run: true, ..params() }, now()).await;
    assert!(report.dry_run);
    assert_eq!(report.filtered, 2);
    assert_eq!(report.sent, 4, "two events to two subscribers would be sent");
    assert_eq!(report.previews.len(), 2);

    assert_eq!(h.sender.count(), 0);
    assert!(h.state.store.get_cache().await.is_none());
    for ev in [
        EconomicEvent::new(Country::Japan, "BoJ Interest Rate Decision", now() + Duration::minutes(10)),
        EconomicEvent::new(Country::UnitedStates, "Core CPI y/y", now() + Duration::minutes(30)),
    ] {
        assert!(!h.state.store.is_deduped(&sent_marker_key(&ev, None)).await);
    }
}

#[tokio::test]
async fn no_subscribers_short_circuits_before_fetch() {
    let h = harness(vec![EconomicEvent::new(
        Country::UnitedStates,
        "Nonfarm Payrolls",
        now() + Duration::minutes(15),
    )]);

    let report = run_alerts(&h.state, params(), now()).await;
    assert_eq!(report.subscribers, 0);
    assert_eq!(report.sent, 0);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.mem.range_reads(), 0);
}

#[tokio::test]
async fn failed_send_does_not_block_other_subscribers() {
    let h = harness(Vec::new());
    for chat in ["10", "20", "30"] {
        h.state.store.add_subscriber(&id(chat), None).await.unwrap();
    }
    h.sender.fail_for("20");
    h.state
        .store
        .insert_manual_events_at(vec![cpi_input()], now())
        .await
        .unwrap();

    let report = run_alerts(&h.state, params(), now()).await;
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    let chats: Vec<_> = h.sender.sent().into_iter().map(|(c, _)| c).collect();
    assert_eq!(chats, vec!["10", "30"]);
}

#[tokio::test]
async fn keyword_filter_applies_in_major_mode_only() {
    let events = vec![
        EconomicEvent::new(Country::UnitedStates, "Retail Sales m/m", now() + Duration::minutes(20)),
        EconomicEvent::new(Country::UnitedStates, "Core CPI y/y", now() + Duration::minutes(30)),
        EconomicEvent::new(Country::Brazil, "Inflation Rate YoY", now() + Duration::minutes(40)),
    ];

    let h = harness(events.clone());
    h.state.store.add_subscriber(&id("1"), None).await.unwrap();
    let major = run_alerts(&h.state, AlertParams { dry_run: true, ..params() }, now()).await;
    assert_eq!(major.provider, Some("fixture"));
    assert_eq!(major.total_events, 3);
    assert_eq!(major.filtered, 1);
    assert!(major.previews[0].contains("Core CPI y/y"));

    let all = run_alerts(
        &h.state,
        AlertParams {
            dry_run: true,
            mode: Mode::All,
            ..params()
        },
        now(),
    )
    .await;
    assert_eq!(all.filtered, 2, "Brazil stays out in all mode too");
    assert!(all.previews.iter().all(|p| !p.contains("Brazil")));
}

#[tokio::test]
async fn manual_source_skips_providers() {
    let h = harness(vec![EconomicEvent::new(
        Country::UnitedStates,
        "FOMC Statement",
        now() + Duration::minutes(5),
    )]);
    h.state.store.add_subscriber(&id("1"), None).await.unwrap();

    let report = run_alerts(
        &h.state,
        AlertParams {
            source: Source::Manual,
            ..params()
        },
        now(),
    )
    .await;
    assert_eq!(h.provider.calls(), 0);
    assert!(report.provider.is_none());
    assert_eq!(report.sent, 0);
}

#[tokio::test]
async fn manual_row_overrides_provider_row() {
    let h = harness(vec![EconomicEvent::new(
        Country::UnitedStates,
        "core cpi y/y",
        now() + Duration::minutes(30),
    )]);
    h.state.store.add_subscriber(&id("1"), None).await.unwrap();
    h.state
        .store
        .insert_manual_events_at(vec![cpi_input()], now())
        .await
        .unwrap();

    let report = run_alerts(&h.state, params(), now()).await;
    assert_eq!(report.total_events, 1);
    assert_eq!(report.sent, 1);
    assert!(h.sender.sent()[0].1.contains("Forecast: 0.3%"));
}

#[tokio::test]
async fn live_run_refreshes_the_upcoming_cache() {
    let h = harness(Vec::new());
    h.state.store.add_subscriber(&id("1"), None).await.unwrap();
    h.state
        .store
        .insert_manual_events_at(vec![cpi_input()], now())
        .await
        .unwrap();

    run_alerts(&h.state, params(), now()).await;
    let cache = h.state.store.get_cache().await.expect("cache written");
    assert_eq!(cache.computed_at, now());
    assert_eq!(cache.events.len(), 1);
}

#[tokio::test]
async fn per_subscriber_scope_alerts_late_joiners_once() {
    let h = harness_with(
        Config {
            dedupe_scope: DedupeScope::Subscriber,
            ..config()
        },
        Vec::new(),
    );
    h.state.store.add_subscriber(&id("1"), None).await.unwrap();
    h.state
        .store
        .insert_manual_events_at(vec![cpi_input()], now())
        .await
        .unwrap();
    assert_eq!(run_alerts(&h.state, params(), now()).await.sent, 1);

    h.state.store.add_subscriber(&id("2"), None).await.unwrap();
    let second = run_alerts(&h.state, params(), now()).await;
    assert_eq!(second.sent, 1);
    assert_eq!(second.skipped_deduped, 1);
    assert_eq!(h.sender.sent()[1].0, "2");

    assert_eq!(run_alerts(&h.state, params(), now()).await.sent, 0);
}
