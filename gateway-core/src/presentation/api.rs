// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! The route table from §6: tool-call lifecycle, run/decision/approval
//! queries, tool-server administration, liveness, and metrics.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::trace::TraceLayer;

use crate::application::{ApprovalController, DecisionPipeline, ToolCatalogService};
use crate::domain::ids::ToolCallId;
use crate::domain::repository::AuditStore;
use crate::domain::tool_server::ToolServerRegistration;
use crate::infrastructure::event_bus::EventBus;

pub struct AppState {
    pub audit: Arc<dyn AuditStore>,
    pub pipeline: Arc<DecisionPipeline>,
    pub approvals: Arc<ApprovalController>,
    pub catalog: Arc<ToolCatalogService>,
    pub metrics_handle: PrometheusHandle,
    pub events: Arc<EventBus>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tool-calls", post(propose_tool_call))
        .route("/tool-calls/:id/approve", post(approve_tool_call))
        .route("/tool-calls/:id/deny", post(deny_tool_call))
        .route("/runs", get(list_runs))
        .route("/runs/:id", get(get_run))
        .route("/decisions", get(list_decisions))
        .route("/approvals/pending", get(list_pending_approvals))
        .route("/mcp/servers", get(list_servers).post(register_server))
        .route("/mcp/servers/:name/tools", get(list_server_tools))
        .route("/mcp/servers/:name/sync", post(sync_server_catalog))
        .route("/events", get(stream_events))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct ProposeRequest {
    tool: String,
    args: Value,
}

async fn propose_tool_call(State(state): State<Arc<AppState>>, Json(payload): Json<ProposeRequest>) -> Response {
    match state.pipeline.propose(&payload.tool, payload.args, json!({})).await {
        Ok(decision) => Json(decision).into_response(),
        Err(err) => pipeline_error_response(err),
    }
}

#[derive(Deserialize, Default)]
struct ApprovalRequest {
    note: Option<String>,
    approver: Option<String>,
}

async fn approve_tool_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
    Json(payload): Json<ApprovalRequest>,
) -> Response {
    match state.approvals.approve(ToolCallId(id), payload.note, payload.approver).await {
        Ok(decision) => Json(decision).into_response(),
        Err(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response(),
    }
}

async fn deny_tool_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
    Json(payload): Json<ApprovalRequest>,
) -> Response {
    match state.approvals.deny(ToolCallId(id), payload.note, payload.approver).await {
        Ok(decision) => Json(decision).into_response(),
        Err(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

const DEFAULT_LIST_LIMIT: usize = 50;

async fn list_runs(State(state): State<Arc<AppState>>, Query(query): Query<LimitQuery>) -> Response {
    match state.audit.list_recent_runs(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)).await {
        Ok(runs) => Json(runs).into_response(),
        Err(err) => audit_error_response(err),
    }
}

async fn get_run(State(state): State<Arc<AppState>>, Path(id): Path<uuid::Uuid>) -> Response {
    match state.audit.get_run_with_tool_calls_and_latest_decision(crate::domain::ids::RunId(id)).await {
        Ok(Some(detail)) => Json(detail_to_json(detail)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "run not found").into_response(),
        Err(err) => audit_error_response(err),
    }
}

fn detail_to_json(detail: crate::domain::repository::RunDetail) -> Value {
    json!({
        "run": detail.run,
        "tool_calls": detail.tool_calls.into_iter().map(|(call, decision)| json!({
            "tool_call": call,
            "latest_decision": decision,
        })).collect::<Vec<_>>(),
    })
}

async fn list_decisions(State(state): State<Arc<AppState>>, Query(query): Query<LimitQuery>) -> Response {
    match state.audit.list_recent_decisions(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)).await {
        Ok(decisions) => Json(decisions).into_response(),
        Err(err) => audit_error_response(err),
    }
}

async fn list_pending_approvals(State(state): State<Arc<AppState>>) -> Response {
    match state.audit.list_pending_approvals().await {
        Ok(calls) => Json(calls).into_response(),
        Err(err) => audit_error_response(err),
    }
}

async fn list_servers(State(state): State<Arc<AppState>>) -> Response {
    match state.audit.list_server_registrations().await {
        Ok(servers) => Json(servers).into_response(),
        Err(err) => audit_error_response(err),
    }
}

async fn register_server(State(state): State<Arc<AppState>>, Json(registration): Json<ToolServerRegistration>) -> Response {
    match state.catalog.register_server(registration).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

async fn list_server_tools(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.audit.list_tool_catalog_for_server(&name).await {
        Ok(tools) => Json(tools).into_response(),
        Err(err) => audit_error_response(err),
    }
}

async fn sync_server_catalog(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.catalog.sync_tool_catalog(&name).await {
        Ok(count) => Json(json!({ "synced": count })).into_response(),
        Err(err) => (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
    }
}

/// Streams decision/approval events to a connected watcher as they're
/// published. A lagging subscriber that misses events under `BroadcastStream`
/// is just skipped rather than disconnected — this is a live tail, not a
/// durable feed.
async fn stream_events(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|item| async move {
        let event = item.ok()?;
        let payload = serde_json::to_string(&gateway_event_json(&event)).ok()?;
        Some(Ok(Event::default().data(payload)))
    });
    Sse::new(stream)
}

fn gateway_event_json(event: &crate::infrastructure::event_bus::GatewayEvent) -> Value {
    use crate::infrastructure::event_bus::GatewayEvent;
    match event {
        GatewayEvent::DecisionCommitted(decision) => json!({
            "type": "decision_committed",
            "decision": decision,
        }),
        GatewayEvent::ApprovalResolved { tool_call_id, approved } => json!({
            "type": "approval_resolved",
            "tool_call_id": tool_call_id,
            "approved": approved,
        }),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

fn pipeline_error_response(err: crate::application::PipelineError) -> Response {
    tracing::error!(error = %err, "decision_pipeline.audit_failure");
    (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response()
}

fn audit_error_response(err: crate::domain::repository::RepositoryError) -> Response {
    use crate::domain::repository::RepositoryError;
    match err {
        RepositoryError::NotFound(detail) => (StatusCode::NOT_FOUND, detail).into_response(),
        other => (StatusCode::SERVICE_UNAVAILABLE, other.to_string()).into_response(),
    }
}
