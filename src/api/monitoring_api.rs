use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::monitoring::{
    Alert, AlertStatistics, AlertingConfiguration, DispatchOutcome, HealthStatus,
    MonitoringDashboard, MonitoringEvent, OperationKind, PerformanceReport, StatusSnapshot,
    SystemHealthReport, MAX_ALERT_HISTORY, MAX_RECENT_EVENTS,
};

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self, cap: usize) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(cap)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSample {
    pub duration_ms: f64,
    pub successful: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    pub acknowledged_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthIndicator {
    pub status: HealthStatus,
    pub components: BTreeMap<&'static str, HealthStatus>,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TestAlertResponse {
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Serialize)]
pub struct RecordedResponse {
    pub recorded: &'static str,
}

/// Liveness-style indicator: 503 only when the system is unhealthy
pub async fn health_indicator(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthIndicator>) {
    let report = state.service.health_report().await;
    let snapshot = state.service.status_snapshot();

    let code = match report.overall_health {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let components = report
        .components()
        .map(|(component, health)| (component.key(), health.status))
        .collect();

    (
        code,
        Json(HealthIndicator {
            status: report.overall_health,
            components,
            last_health_check: snapshot.last_health_check,
        }),
    )
}

pub async fn get_dashboard(State(state): State<AppState>) -> Json<MonitoringDashboard> {
    Json(state.service.dashboard().await)
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.service.status_snapshot())
}

pub async fn get_detailed_health(State(state): State<AppState>) -> Json<SystemHealthReport> {
    Json(state.service.health_report().await)
}

/// Run the scheduled health check now, status transitions and alerts included
pub async fn trigger_health_check(State(state): State<AppState>) -> Json<SystemHealthReport> {
    info!("Manual health check requested");
    Json(state.service.perform_health_check().await)
}

pub async fn get_performance(State(state): State<AppState>) -> Json<PerformanceReport> {
    Json(state.service.performance_report())
}

pub async fn get_recent_events(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> Json<Vec<MonitoringEvent>> {
    Json(state.service.recent_events(params.resolve(MAX_RECENT_EVENTS)))
}

pub async fn get_alert_statistics(State(state): State<AppState>) -> Json<AlertStatistics> {
    Json(state.service.dispatcher().statistics())
}

pub async fn get_recent_alerts(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> Json<Vec<Alert>> {
    Json(
        state
            .service
            .dispatcher()
            .recent_alerts(params.resolve(MAX_ALERT_HISTORY)),
    )
}

pub async fn send_test_alert(State(state): State<AppState>) -> Json<TestAlertResponse> {
    let outcome = state.service.dispatcher().send_test_alert();
    Json(TestAlertResponse { outcome })
}

pub async fn get_alert_configuration(
    State(state): State<AppState>,
) -> Json<AlertingConfiguration> {
    Json(state.service.dispatcher().configuration())
}

pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<AcknowledgeRequest>>,
) -> Result<Json<Alert>, StatusCode> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let by = request.acknowledged_by.unwrap_or_else(|| "api".to_string());

    state
        .service
        .dispatcher()
        .acknowledge(id, &by)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

fn record(state: &AppState, kind: OperationKind, sample: OperationSample) -> Json<RecordedResponse> {
    state
        .service
        .record_operation(kind, sample.duration_ms, sample.successful);
    Json(RecordedResponse {
        recorded: kind.metric_key(),
    })
}

pub async fn record_session_capture(
    State(state): State<AppState>,
    Json(sample): Json<OperationSample>,
) -> Json<RecordedResponse> {
    record(&state, OperationKind::SessionCapture, sample)
}

pub async fn record_documentation_sync(
    State(state): State<AppState>,
    Json(sample): Json<OperationSample>,
) -> Json<RecordedResponse> {
    record(&state, OperationKind::DocumentationSync, sample)
}

pub async fn record_quality_gate(
    State(state): State<AppState>,
    Json(sample): Json<OperationSample>,
) -> Json<RecordedResponse> {
    record(&state, OperationKind::QualityGateExecution, sample)
}

pub async fn record_context_recovery(
    State(state): State<AppState>,
    Json(sample): Json<OperationSample>,
) -> Json<RecordedResponse> {
    record(&state, OperationKind::ContextRecovery, sample)
}
