// Tephra Server - HTTP query and management API
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON API over the shared store and rule book.
//!
//! Handlers only translate between HTTP and the core types: every parameter
//! is validated by `tephra` itself and every validation failure becomes a
//! 400 with an `{error, message}` body.

use crate::error::ApiError;
use crate::metrics::encode_metrics;
use crate::notify::{dispatch, Broadcast, Delivery, Dispatcher};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tephra::aggregate::DEFAULT_WINDOW;
use tephra::query::parse_optional_device_id;
use tephra::{
    aggregate, AutomatedRule, Channel, ChannelStore, ChannelSummary, HistoryQuery, MetricSet,
    QueryEngine, Reading, RuleBook, RuleRequest, SeriesQuery, TimeRangePolicy,
};
use tracing::info;

/// State shared by all handlers
pub struct AppState {
    pub store: Arc<ChannelStore>,
    pub rules: Arc<RuleBook>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub time_range_policy: TimeRangePolicy,
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/data/:channel", get(series_handler))
        .route("/api/data/:channel/history", get(history_handler))
        .route("/api/latest", get(latest_handler))
        .route("/api/devices", get(devices_handler))
        .route("/api/collective/multi", get(aggregate_handler))
        .route("/api/debug/latest", get(debug_handler))
        .route(
            "/api/automated-rules",
            get(list_rules_handler).post(upsert_rule_handler),
        )
        .route("/api/automated-rules/:id", delete(delete_rule_handler))
        .route("/api/notify", post(notify_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// ============================================================
// Queries
// ============================================================

/// Query string of a series request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesParams {
    pub device_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Filtered series of one channel, oldest first.
pub async fn series_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    params: Result<Query<SeriesParams>, QueryRejection>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadQuery(e.body_text()))?;
    let query = SeriesQuery::parse(
        &channel,
        params.device_id.as_deref(),
        params.start_time.as_deref(),
        params.end_time.as_deref(),
        state.time_range_policy,
    )?;
    Ok(Json(QueryEngine::new(&state.store).query(&query)))
}

/// Query string of a history request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub limit: Option<String>,
    pub device_id: Option<String>,
}

/// Most recent readings of one channel, newest first.
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadQuery(e.body_text()))?;
    let query = HistoryQuery::parse(
        &channel,
        params.limit.as_deref(),
        params.device_id.as_deref(),
    )?;
    Ok(Json(QueryEngine::new(&state.store).history(&query)))
}

/// Query string carrying only a device filter
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceParams {
    pub device_id: Option<String>,
}

/// Latest reading of every channel, `null` where there is none.
pub async fn latest_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<DeviceParams>, QueryRejection>,
) -> Result<Json<BTreeMap<Channel, Option<Reading>>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadQuery(e.body_text()))?;
    let device_id = parse_optional_device_id(params.device_id.as_deref())?;
    Ok(Json(QueryEngine::new(&state.store).latest_all(device_id)))
}

/// Device ids present in retained history.
pub async fn devices_handler(State(state): State<Arc<AppState>>) -> Json<Vec<u16>> {
    Json(QueryEngine::new(&state.store).list_devices())
}

/// Query string of an aggregation request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateParams {
    pub sensor_types: Option<String>,
    pub processing: Option<String>,
    pub window: Option<String>,
}

/// Windowed statistics over several channels.
pub async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<AggregateParams>, QueryRejection>,
) -> Result<Json<BTreeMap<Channel, ChannelSummary>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadQuery(e.body_text()))?;
    let metrics = MetricSet::parse(params.processing.as_deref().unwrap_or_default())?;
    let window = params
        .window
        .as_deref()
        .and_then(|w| w.trim().parse::<usize>().ok())
        .filter(|w| *w > 0)
        .unwrap_or(DEFAULT_WINDOW);

    let names = params.sensor_types.unwrap_or_default();
    let channels: Vec<&str> = names.split(',').map(str::trim).collect();
    Ok(Json(aggregate(&state.store, &channels, window, &metrics)))
}

/// Store snapshot for troubleshooting
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugView {
    pub timestamp: DateTime<Utc>,
    pub capacity: usize,
    pub stored_data: BTreeMap<Channel, Option<Reading>>,
    pub data_points: BTreeMap<Channel, usize>,
}

/// Latest reading and retained count of every channel.
pub async fn debug_handler(State(state): State<Arc<AppState>>) -> Json<DebugView> {
    let stats = QueryEngine::new(&state.store).stats();
    let mut stored_data = BTreeMap::new();
    let mut data_points = BTreeMap::new();
    for channel in Channel::ALL {
        let entry = stats.channels.get(&channel);
        stored_data.insert(channel, entry.and_then(|c| c.latest.clone()));
        data_points.insert(channel, entry.map_or(0, |c| c.count));
    }

    Json(DebugView {
        timestamp: Utc::now(),
        capacity: stats.capacity,
        stored_data,
        data_points,
    })
}

// ============================================================
// Rules and notifications
// ============================================================

/// All rules keyed by id.
pub async fn list_rules_handler(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, AutomatedRule>> {
    Json(
        state
            .rules
            .list()
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect(),
    )
}

/// Reply to a rule upsert
#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    pub success: bool,
    pub rule: AutomatedRule,
    pub replaced: bool,
    pub superseded: Vec<String>,
}

/// Create or replace a rule.
pub async fn upsert_rule_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RuleRequest>, JsonRejection>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadBody(e.body_text()))?;
    let rule = AutomatedRule::try_from(request)?;
    let outcome = state.rules.upsert(rule.clone());

    info!(
        rule = %rule.id,
        channel = %rule.channel,
        threshold = rule.threshold,
        comparison = %rule.comparison,
        enabled = rule.enabled,
        "automated rule set"
    );

    Ok(Json(UpsertResponse {
        success: true,
        rule,
        replaced: outcome.replaced.is_some(),
        superseded: outcome.superseded,
    }))
}

/// Delete a rule by id.
pub async fn delete_rule_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.rules.remove(&id) {
        Some(rule) => {
            info!(rule = %rule.id, "automated rule deleted");
            Ok(Json(serde_json::json!({ "success": true })))
        }
        None => Err(ApiError::RuleNotFound(id)),
    }
}

/// Reply to a broadcast
#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<Delivery>,
}

/// Send a free-text message to several notification channels.
pub async fn notify_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Broadcast>, JsonRejection>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let Json(broadcast) = body.map_err(|e| ApiError::BadBody(e.body_text()))?;
    let (targets, message) = broadcast.prepare(&state.store)?;
    let results = dispatch(state.dispatcher.as_ref(), targets, &message).await;

    Ok(Json(NotifyResponse {
        success: results.iter().all(|d| d.success),
        message,
        results,
    }))
}

// ============================================================
// Operations
// ============================================================

/// Health check handler.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Metrics handler - returns Prometheus text format.
pub async fn metrics_handler() -> Result<impl IntoResponse, ApiError> {
    let body = encode_metrics().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        body,
    ))
}
