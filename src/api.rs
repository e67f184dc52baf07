use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::commands;
use crate::error::{ApiError, ApiResult};
use crate::event::{value_to_text, RawEvent};
use crate::notify::{render_list, Lang};
use crate::pipeline::{preview, run_alerts, AlertQuery, AlertReport};
use crate::state::AppState;
use crate::store::Rejection;
use crate::subscriber::SubscriberId;

const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const CRON_SECRET_HEADER: &str = "x-cron-secret";
const DEFAULT_ADMIN_DAYS: i64 = 7;
const MAX_ADMIN_DAYS: i64 = 90;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/telegram/webhook", post(telegram_webhook))
        .route("/cron/alerts", get(cron_alerts).post(cron_alerts))
        .route("/admin/events", post(admin_insert_events).get(admin_list_events))
        .route("/admin/subscribers", get(admin_subscribers))
        .route("/admin/subscribers/cleanup", post(admin_cleanup_subscribers))
        .route("/api/upcoming", get(api_upcoming))
        .route("/api/subscribe", post(api_subscribe))
        .route("/api/unsubscribe", post(api_unsubscribe))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---- auth ----

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `Authorization: Bearer <secret>` or `X-Cron-Secret: <secret>`. Without
/// a configured secret every call is refused.
fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.config.admin_secret.as_deref() else {
        tracing::warn!("admin secret not configured, refusing authenticated endpoint");
        return Err(ApiError::Unauthorized);
    };
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let cron = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    let ok = [bearer, cron]
        .into_iter()
        .flatten()
        .any(|given| constant_time_eq(given.as_bytes(), expected.as_bytes()));
    if ok {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

// ---- webhook ----

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    edited_message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

fn display_name(msg: &Message) -> Option<String> {
    msg.from
        .as_ref()
        .and_then(|u| u.username.clone().or_else(|| u.first_name.clone()))
        .or_else(|| msg.chat.title.clone())
}

/// Always acknowledges with 200 so the platform never retries an update.
async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let ack = Json(json!({ "ok": true }));

    if let Some(expected) = state.config.webhook_secret.as_deref() {
        let given = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !constant_time_eq(given.as_bytes(), expected.as_bytes()) {
            tracing::warn!(target: "webhook", "secret token mismatch, ignoring update");
            return ack;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            tracing::debug!(target: "webhook", error = %e, "unparseable update");
            return ack;
        }
    };
    let Some(msg) = update.message.or(update.edited_message) else {
        return ack;
    };
    let Some(text) = msg.text.as_deref() else {
        return ack;
    };

    let chat_id = msg.chat.id.to_string();
    let name = display_name(&msg);
    if let Some(reply) = commands::handle(&state, &chat_id, name.as_deref(), text).await {
        if let Err(e) = state.sender.send_message(&chat_id, &reply).await {
            tracing::warn!(target: "webhook", chat_id = %chat_id, error = %format!("{e:#}"), "reply failed");
        }
    }
    ack
}

// ---- cron ----

async fn cron_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<AlertQuery>,
) -> ApiResult<Json<AlertReport>> {
    authorize(&state, &headers)?;
    let report = run_alerts(&state, q.into_params(), Utc::now()).await;
    Ok(Json(report))
}

// ---- admin ----

/// Accepts a bare list, `{"events": [...]}`, or a single event object.
fn candidates(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("events") {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => vec![Value::Object(map)],
        },
        other => vec![other],
    }
}

async fn admin_insert_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    authorize(&state, &headers)?;

    let mut parsed = Vec::new();
    let mut positions = Vec::new();
    let mut rejected = Vec::new();
    for (index, item) in candidates(body).into_iter().enumerate() {
        match serde_json::from_value::<RawEvent>(item) {
            Ok(raw) => {
                parsed.push(raw);
                positions.push(index);
            }
            Err(e) => rejected.push(Rejection {
                index,
                reason: format!("malformed event: {e}"),
            }),
        }
    }

    let mut report = if parsed.is_empty() {
        Default::default()
    } else {
        state.store.insert_manual_events(parsed).await?
    };
    for r in &mut report.rejected {
        r.index = positions[r.index];
    }
    rejected.append(&mut report.rejected);
    rejected.sort_by_key(|r| r.index);

    if report.accepted == 0 {
        let body = json!({ "ok": false, "error": "no valid events", "rejected": rejected });
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }
    Ok(Json(json!({
        "ok": true,
        "accepted": report.accepted,
        "pruned": report.pruned,
        "rejected": rejected,
    }))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
struct DaysQuery {
    days: Option<String>,
}

async fn admin_list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<DaysQuery>,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let days = q
        .days
        .and_then(|d| d.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_ADMIN_DAYS)
        .clamp(1, MAX_ADMIN_DAYS);
    let now = Utc::now();
    let events = state
        .store
        .list_manual_events(now, now + ChronoDuration::days(days))
        .await;
    Ok(Json(json!({ "ok": true, "days": days, "count": events.len(), "events": events })))
}

async fn admin_subscribers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let ids = state.store.list_subscribers().await;
    let mut subscribers = Vec::with_capacity(ids.len());
    for id in &ids {
        let name = state.store.subscriber_name(id).await;
        subscribers.push(json!({ "id": id, "name": name }));
    }
    Ok(Json(json!({ "ok": true, "count": ids.len(), "subscribers": subscribers })))
}

async fn admin_cleanup_subscribers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let removed = state.store.purge_invalid_subscribers().await?;
    let count = state.store.subscriber_count().await;
    Ok(Json(json!({ "ok": true, "removed": removed, "count": count })))
}

// ---- public ----

#[derive(Debug, Default, Deserialize)]
struct UpcomingQuery {
    limit: Option<String>,
    lang: Option<String>,
}

async fn api_upcoming(
    State(state): State<AppState>,
    Query(q): Query<UpcomingQuery>,
) -> Json<Value> {
    let limit = q
        .limit
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(crate::filter::DEFAULT_LIMIT);
    let lang = q.lang.as_deref().and_then(Lang::parse).unwrap_or_default();
    let p = preview::upcoming(&state, limit, Utc::now()).await;
    Json(json!({
        "ok": true,
        "text": render_list(&p.events, lang),
        "events": p.events,
        "source": p.source,
        "computed_at": p.computed_at,
    }))
}

#[derive(Debug, Deserialize)]
struct SubscribeReq {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
}

fn subscriber_from(req: &SubscribeReq) -> ApiResult<SubscriberId> {
    let raw = value_to_text(&req.id).unwrap_or_default();
    SubscriberId::parse(&raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn api_subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeReq>,
) -> ApiResult<Json<Value>> {
    let id = subscriber_from(&req)?;
    let count = state.store.add_subscriber(&id, req.name.as_deref()).await?;
    Ok(Json(json!({ "ok": true, "id": id, "count": count })))
}

async fn api_unsubscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeReq>,
) -> ApiResult<Json<Value>> {
    let id = subscriber_from(&req)?;
    let count = state.store.remove_subscriber(&id).await?;
    Ok(Json(json!({ "ok": true, "id": id, "count": count })))
}
